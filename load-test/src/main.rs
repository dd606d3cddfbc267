use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Target URL (e.g., http://localhost:8000)
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    /// Number of voters to simulate
    #[arg(short = 'n', long, default_value_t = 100)]
    voters: usize,

    /// Number of concurrent sessions
    #[arg(short, long, default_value_t = 10)]
    concurrency: usize,

    /// Instead of the load run, race two concurrent submissions for the same
    /// voter and check that exactly one survives the uniqueness constraint
    #[arg(long)]
    race: bool,

    /// DNI to use for the race check (must verify against the configured
    /// identity provider)
    #[arg(long, default_value = "12345678")]
    race_dni: String,
}

#[derive(Deserialize, Debug, Clone)]
struct Candidate {
    id: String,
    category: String,
}

#[derive(Serialize)]
struct VerifyRequest {
    dni: String,
}

#[derive(Serialize)]
struct SelectRequest {
    candidate_id: String,
}

fn random_dni(rng: &mut impl Rng) -> String {
    format!("{:08}", rng.gen_range(10_000_000..100_000_000u32))
}

async fn fetch_candidates(client: &Client, base_url: &str) -> Result<Vec<Candidate>> {
    let candidates: Vec<Candidate> = client
        .get(format!("{}/api/candidates", base_url))
        .send()
        .await
        .context("Failed to fetch candidates")?
        .json()
        .await
        .context("Failed to parse candidates")?;
    Ok(candidates)
}

/// One full voter flow: verify, pick one candidate per category, submit.
async fn run_voter_simulation(
    client: &Client,
    base_url: &str,
    dni: &str,
    candidates: &[Candidate],
) -> Result<()> {
    client
        .post(format!("{}/api/verify", base_url))
        .json(&VerifyRequest {
            dni: dni.to_string(),
        })
        .send()
        .await
        .context("Failed to send verify request")?
        .error_for_status()
        .context("Identity verification failed")?;

    let picks: Vec<Candidate> = {
        let mut rng = rand::thread_rng();
        ["presidencial", "distrital", "regional"]
            .iter()
            .filter_map(|category| {
                let pool: Vec<&Candidate> = candidates
                    .iter()
                    .filter(|c| c.category == *category)
                    .collect();
                pool.choose(&mut rng).map(|c| (*c).clone())
            })
            .collect()
    };
    anyhow::ensure!(!picks.is_empty(), "No candidates available");

    for pick in &picks {
        client
            .post(format!("{}/api/ballot/select", base_url))
            .json(&SelectRequest {
                candidate_id: pick.id.clone(),
            })
            .send()
            .await
            .context("Failed to send selection")?
            .error_for_status()
            .context("Selection rejected")?;
    }

    client
        .post(format!("{}/api/votes", base_url))
        .send()
        .await
        .context("Failed to send submission")?
        .error_for_status()
        .context("Submission failed")?;

    Ok(())
}

/// Verify the same voter twice (two cookie-isolated sessions), select the
/// same candidate in both, and submit simultaneously. The pre-checks pass in
/// both sessions; the database constraint must reject exactly one insert.
async fn run_race_check(base_url: &str, dni: &str) -> Result<()> {
    let make_session = || async {
        let client = Client::builder().cookie_store(true).build().unwrap();
        client
            .post(format!("{}/api/verify", base_url))
            .json(&VerifyRequest {
                dni: dni.to_string(),
            })
            .send()
            .await
            .context("Failed to verify")?
            .error_for_status()
            .context("Verification failed")?;
        Ok::<Client, anyhow::Error>(client)
    };

    let first = make_session().await?;
    let second = make_session().await?;

    let candidates = fetch_candidates(&first, base_url).await?;
    let pick = candidates
        .iter()
        .find(|c| c.category == "presidencial")
        .context("No presidential candidate available")?;

    for client in [&first, &second] {
        client
            .post(format!("{}/api/ballot/select", base_url))
            .json(&SelectRequest {
                candidate_id: pick.id.clone(),
            })
            .send()
            .await?
            .error_for_status()
            .context("Selection rejected")?;
    }

    let submit = |client: &Client| {
        let client = client.clone();
        let url = format!("{}/api/votes", base_url);
        async move { client.post(url).send().await }
    };

    let (a, b) = tokio::join!(submit(&first), submit(&second));
    let statuses = [a?.status(), b?.status()];

    let successes = statuses.iter().filter(|s| s.is_success()).count();
    let conflicts = statuses
        .iter()
        .filter(|s| **s == StatusCode::CONFLICT)
        .count();

    println!("📊 Race outcome: {:?}", statuses);
    anyhow::ensure!(
        successes == 1 && conflicts == 1,
        "expected exactly one durable vote and one conflict, got {} success(es) / {} conflict(s)",
        successes,
        conflicts
    );
    println!("✅ One durable vote survived; the constraint held");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.race {
        println!("🏁 Racing two submissions for DNI {}", args.race_dni);
        return run_race_check(&args.url, &args.race_dni).await;
    }

    println!("🚀 Starting load test against {}", args.url);
    println!("👥 Voters: {}", args.voters);
    println!("⚡ Concurrency: {}", args.concurrency);

    let bootstrap = Client::new();
    let candidates = fetch_candidates(&bootstrap, &args.url).await?;
    if candidates.is_empty() {
        anyhow::bail!("No candidates found on the server. Cannot vote.");
    }
    println!("📋 Found {} candidates", candidates.len());

    let candidates = Arc::new(candidates);
    let base_url = Arc::new(args.url.clone());

    let success_count = Arc::new(AtomicUsize::new(0));
    let failure_count = Arc::new(AtomicUsize::new(0));

    let pb = ProgressBar::new(args.voters as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}")
            .unwrap()
            .progress_chars("=>-"),
    );

    let start_time = Instant::now();

    let results = stream::iter(0..args.voters)
        .map(|_| {
            let base_url = base_url.clone();
            let candidates = candidates.clone();
            let success_count = success_count.clone();
            let failure_count = failure_count.clone();
            let pb = pb.clone();

            async move {
                // Dedicated client per voter to isolate session cookies
                let client = Client::builder().cookie_store(true).build().unwrap();
                let dni = random_dni(&mut rand::thread_rng());

                match run_voter_simulation(&client, &base_url, &dni, &candidates).await {
                    Ok(_) => {
                        success_count.fetch_add(1, Ordering::Relaxed);
                        pb.set_message(format!(
                            "Success: {}",
                            success_count.load(Ordering::Relaxed)
                        ));
                    }
                    Err(_e) => {
                        failure_count.fetch_add(1, Ordering::Relaxed);
                        pb.set_message(format!(
                            "Errors: {}",
                            failure_count.load(Ordering::Relaxed)
                        ));
                    }
                }
                pb.inc(1);
            }
        })
        .buffer_unordered(args.concurrency)
        .collect::<Vec<()>>();

    results.await;

    pb.finish_with_message("Done");

    let duration = start_time.elapsed();
    let successes = success_count.load(Ordering::Relaxed);
    let failures = failure_count.load(Ordering::Relaxed);
    let rps = successes as f64 / duration.as_secs_f64();

    println!("\n📊 Results:");
    println!("   Time taken: {:?}", duration);
    println!("   Total voters: {}", args.voters);
    println!("   Completed submissions: {}", successes);
    println!("   Failed submissions: {}", failures);
    println!("   Throughput: {:.2} submissions/sec", rps);

    Ok(())
}
