//! Identity lookup against the national registry (RENIEC) through the
//! configured provider, plus normalization of its heterogeneous responses.
//!
//! The provider has shipped at least a dozen field-naming conventions over
//! time (`first_name`, `nombres`, `nombre`, ...). Each canonical field is an
//! ordered alias list below, so a new provider variant is a data change.

use chrono::NaiveDate;
use reqwest::header::ACCEPT;
use rocket::serde::Serialize;
use serde_json::{Map, Value};

use crate::config::AppConfig;
use crate::errors::IdentityError;
use crate::models::NewVoter;

/// Placeholder birth date when the provider omits one. A known data-quality
/// compromise carried over from the registry, not a correctness guarantee.
const FALLBACK_BIRTH_DATE: (i32, u32, u32) = (1990, 1, 1);

const ALIAS_NUMERO: &[&str] = &["document_number", "numero", "dni"];
const ALIAS_NOMBRES: &[&str] = &[
    "first_name",
    "nombres",
    "nombre",
    "nombres_completos",
    "primer_nombre",
];
const ALIAS_APELLIDO_PATERNO: &[&str] = &[
    "first_last_name",
    "apellidoPaterno",
    "apellido_paterno",
    "apellido_p",
    "paterno",
];
const ALIAS_APELLIDO_MATERNO: &[&str] = &[
    "second_last_name",
    "apellidoMaterno",
    "apellido_materno",
    "apellido_m",
    "materno",
];
const ALIAS_COD_VERIFICA: &[&str] = &["codVerifica", "cod_verifica", "codigo_verificacion"];
const ALIAS_FECHA_NACIMIENTO: &[&str] = &[
    "fechaNacimiento",
    "fecha_nacimiento",
    "birth_date",
    "fechaNac",
    "fecha_nac",
    "nacimiento",
    "birthdate",
];
const ALIAS_SEXO: &[&str] = &["sexo", "genero", "gender", "sex"];
const ALIAS_ESTADO_CIVIL: &[&str] = &[
    "estadoCivil",
    "estado_civil",
    "marital_status",
    "maritalStatus",
    "estado",
];
const ALIAS_DIRECCION: &[&str] = &[
    "direccion",
    "direccion_completa",
    "address",
    "domicilio",
    "direccion_actual",
    "residence_address",
];
const ALIAS_UBIGEO: &[&str] = &["ubigeo", "codigo_ubigeo", "ubigeo_code", "ubigeoCode"];
const ALIAS_DISTRITO: &[&str] = &[
    "distrito",
    "distrito_nombre",
    "district",
    "district_name",
    "districtName",
];
const ALIAS_PROVINCIA: &[&str] = &[
    "provincia",
    "provincia_nombre",
    "province",
    "province_name",
    "provinceName",
];
const ALIAS_DEPARTAMENTO: &[&str] = &[
    "departamento",
    "departamento_nombre",
    "department",
    "department_name",
    "departmentName",
    "region",
];
const ALIAS_FOTO: &[&str] = &[
    "foto",
    "photo_url",
    "foto_url",
    "photo",
    "imagen",
    "foto_dni",
    "image_url",
    "photoUrl",
];

/// Canonical identity record after normalization. Serialized field names
/// match the original proxy contract.
#[derive(Debug, Clone, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct ReniecRecord {
    pub numero: String,
    pub nombres: String,
    #[serde(rename = "apellidoPaterno")]
    pub apellido_paterno: String,
    #[serde(rename = "apellidoMaterno")]
    pub apellido_materno: String,
    #[serde(rename = "codVerifica")]
    pub cod_verifica: Option<String>,
    #[serde(rename = "fechaNacimiento")]
    pub fecha_nacimiento: Option<String>,
    pub sexo: Option<String>,
    #[serde(rename = "estadoCivil")]
    pub estado_civil: Option<String>,
    pub direccion: Option<String>,
    pub ubigeo: Option<String>,
    pub distrito: Option<String>,
    pub provincia: Option<String>,
    pub departamento: Option<String>,
    pub foto: Option<String>,
}

impl ReniecRecord {
    /// Build the registry row. Missing address/location fields become
    /// explicit placeholders; the registry never stores nulls for them.
    pub fn into_new_voter(self, dni: &str) -> NewVoter {
        let full_name = format!(
            "{} {} {}",
            self.nombres, self.apellido_paterno, self.apellido_materno
        )
        .trim()
        .to_string();

        NewVoter {
            dni: dni.to_string(),
            full_name,
            address: self
                .direccion
                .unwrap_or_else(|| "No especificada".to_string()),
            district: self
                .distrito
                .unwrap_or_else(|| "No especificado".to_string()),
            province: self
                .provincia
                .unwrap_or_else(|| "No especificado".to_string()),
            department: self
                .departamento
                .unwrap_or_else(|| "No especificado".to_string()),
            birth_date: normalize_birth_date(self.fecha_nacimiento.as_deref()),
            photo_url: self.foto,
        }
    }
}

/// An identifier is exactly 8 ASCII digits. Checked before any network call.
pub fn is_valid_dni(dni: &str) -> bool {
    dni.len() == 8 && dni.bytes().all(|b| b.is_ascii_digit())
}

/// Query the provider and normalize the response. Pure lookup: persistence
/// is a separate step.
pub async fn lookup(
    client: &reqwest::Client,
    config: &AppConfig,
    dni: &str,
) -> Result<ReniecRecord, IdentityError> {
    if !is_valid_dni(dni) {
        return Err(IdentityError::InvalidFormat);
    }

    let url = format!("{}/{}", config.reniec_api_url.trim_end_matches('/'), dni);
    let mut request = client.get(&url).header(ACCEPT, "application/json");
    if let Some(key) = &config.reniec_api_key {
        // The provider has accepted either header depending on the plan.
        request = request.bearer_auth(key).header("X-API-Key", key);
    }

    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let message = response
            .json::<Value>()
            .await
            .ok()
            .and_then(|body| {
                ["message", "error"]
                    .iter()
                    .find_map(|key| body.get(*key)?.as_str().map(str::to_string))
            })
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
        return Err(IdentityError::Upstream {
            status: status.as_u16(),
            message,
        });
    }

    let body: Value = response.json().await.map_err(|_| IdentityError::Upstream {
        status: status.as_u16(),
        message: "La respuesta no es un JSON válido".to_string(),
    })?;

    normalize(&body, dni)
}

/// Normalize a provider payload into the canonical record. The payload may
/// carry the fields directly or nested under `data`.
pub fn normalize(payload: &Value, dni: &str) -> Result<ReniecRecord, IdentityError> {
    let data = payload.get("data").unwrap_or(payload);
    let fields = data.as_object().ok_or(IdentityError::IncompleteRecord)?;

    let nombres = first_match(fields, ALIAS_NOMBRES).unwrap_or_default();
    let apellido_paterno = first_match(fields, ALIAS_APELLIDO_PATERNO).unwrap_or_default();

    // Minimum viable identity: without these the record is unusable.
    if nombres.is_empty() || apellido_paterno.is_empty() {
        return Err(IdentityError::IncompleteRecord);
    }

    Ok(ReniecRecord {
        numero: first_match(fields, ALIAS_NUMERO).unwrap_or_else(|| dni.to_string()),
        nombres,
        apellido_paterno,
        apellido_materno: first_match(fields, ALIAS_APELLIDO_MATERNO).unwrap_or_default(),
        cod_verifica: first_match(fields, ALIAS_COD_VERIFICA),
        fecha_nacimiento: first_match(fields, ALIAS_FECHA_NACIMIENTO),
        sexo: first_match(fields, ALIAS_SEXO),
        estado_civil: first_match(fields, ALIAS_ESTADO_CIVIL),
        direccion: first_match(fields, ALIAS_DIRECCION),
        ubigeo: first_match(fields, ALIAS_UBIGEO),
        distrito: first_match(fields, ALIAS_DISTRITO),
        provincia: first_match(fields, ALIAS_PROVINCIA),
        departamento: first_match(fields, ALIAS_DEPARTAMENTO),
        foto: first_match(fields, ALIAS_FOTO),
    })
}

/// First alias present with a non-empty string value. Numeric values are
/// accepted too; some variants ship the document number as a number.
fn first_match(fields: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases.iter().find_map(|alias| match fields.get(*alias) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Accepts `DD/MM/YYYY` or `YYYY-MM-DD`; anything else (or nothing) falls
/// back to the placeholder date.
pub fn normalize_birth_date(raw: Option<&str>) -> NaiveDate {
    let fallback = {
        let (y, m, d) = FALLBACK_BIRTH_DATE;
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    };

    let Some(raw) = raw else {
        return fallback;
    };

    let parsed = if raw.contains('/') {
        NaiveDate::parse_from_str(raw, "%d/%m/%Y")
    } else {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    };
    parsed.unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_exactly_eight_digits() {
        assert!(is_valid_dni("12345678"));
        assert!(!is_valid_dni("1234567"));
        assert!(!is_valid_dni("123456789"));
        assert!(!is_valid_dni("1234567a"));
        assert!(!is_valid_dni(""));
    }

    #[test]
    fn normalizes_spanish_snake_case_variant() {
        let payload = json!({
            "data": {
                "numero": "12345678",
                "nombres": "MARIA ELENA",
                "apellido_paterno": "QUISPE",
                "apellido_materno": "MAMANI",
                "fecha_nacimiento": "15/03/1985",
                "distrito": "Miraflores",
                "provincia": "Lima",
                "departamento": "Lima"
            }
        });

        let record = normalize(&payload, "12345678").unwrap();
        assert_eq!(record.nombres, "MARIA ELENA");
        assert_eq!(record.apellido_paterno, "QUISPE");
        assert_eq!(record.apellido_materno, "MAMANI");
        assert_eq!(record.distrito.as_deref(), Some("Miraflores"));
    }

    #[test]
    fn normalizes_english_variant_without_data_wrapper() {
        let payload = json!({
            "first_name": "JOSE",
            "first_last_name": "GARCIA",
            "second_last_name": "TORRES",
            "birth_date": "1990-07-20",
            "district": "Surco"
        });

        let record = normalize(&payload, "87654321").unwrap();
        assert_eq!(record.numero, "87654321");
        assert_eq!(record.nombres, "JOSE");
        assert_eq!(record.apellido_paterno, "GARCIA");
        assert_eq!(record.distrito.as_deref(), Some("Surco"));
    }

    #[test]
    fn missing_surname_is_incomplete_not_partial_success() {
        let payload = json!({ "data": { "nombres": "JOSE" } });
        assert!(matches!(
            normalize(&payload, "12345678"),
            Err(IdentityError::IncompleteRecord)
        ));
    }

    #[test]
    fn non_object_payload_is_incomplete() {
        assert!(matches!(
            normalize(&json!("unexpected"), "12345678"),
            Err(IdentityError::IncompleteRecord)
        ));
    }

    #[test]
    fn birth_date_converts_slash_format() {
        assert_eq!(
            normalize_birth_date(Some("15/03/1985")),
            NaiveDate::from_ymd_opt(1985, 3, 15).unwrap()
        );
        assert_eq!(
            normalize_birth_date(Some("1990-07-20")),
            NaiveDate::from_ymd_opt(1990, 7, 20).unwrap()
        );
    }

    #[test]
    fn missing_or_garbled_birth_date_uses_placeholder() {
        let placeholder = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap();
        assert_eq!(normalize_birth_date(None), placeholder);
        assert_eq!(normalize_birth_date(Some("marzo de 1985")), placeholder);
    }

    #[test]
    fn registry_row_gets_placeholders_for_missing_location() {
        let payload = json!({ "nombres": "ANA", "apellidoPaterno": "FLORES" });
        let voter = normalize(&payload, "11223344")
            .unwrap()
            .into_new_voter("11223344");
        assert_eq!(voter.full_name, "ANA FLORES");
        assert_eq!(voter.address, "No especificada");
        assert_eq!(voter.district, "No especificado");
        assert_eq!(voter.province, "No especificado");
        assert_eq!(voter.department, "No especificado");
        assert_eq!(voter.photo_url, None);
    }
}
