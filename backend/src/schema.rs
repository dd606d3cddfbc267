diesel::table! {
    candidates (id) {
        id -> Uuid,
        #[max_length = 255]
        name -> Varchar,
        #[max_length = 500]
        photo_url -> Nullable<Varchar>,
        description -> Nullable<Text>,
        #[max_length = 255]
        party_name -> Varchar,
        #[max_length = 500]
        party_logo_url -> Nullable<Varchar>,
        party_description -> Nullable<Text>,
        academic_formation -> Nullable<Text>,
        professional_experience -> Nullable<Text>,
        campaign_proposal -> Nullable<Text>,
        #[max_length = 20]
        category -> Varchar,
        vote_count -> Integer,
    }
}

diesel::table! {
    voters (dni) {
        #[max_length = 8]
        dni -> Varchar,
        #[max_length = 255]
        full_name -> Varchar,
        #[max_length = 255]
        address -> Varchar,
        #[max_length = 100]
        district -> Varchar,
        #[max_length = 100]
        province -> Varchar,
        #[max_length = 100]
        department -> Varchar,
        birth_date -> Date,
        #[max_length = 500]
        photo_url -> Nullable<Varchar>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    votes (id) {
        id -> Uuid,
        #[max_length = 8]
        voter_dni -> Varchar,
        candidate_id -> Nullable<Uuid>,
        #[max_length = 20]
        category -> Varchar,
        voted_at -> Timestamp,
    }
}

diesel::joinable!(votes -> candidates (candidate_id));
diesel::joinable!(votes -> voters (voter_dni));

diesel::allow_tables_to_appear_in_same_query!(candidates, voters, votes,);
