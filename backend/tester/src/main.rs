//! Fires concurrent initial admin registrations at a running server and
//! checks that exactly one of them wins.
use anyhow::bail;
use clap::Parser;
use reqwest::{Client, StatusCode};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:1111")]
    base_url: String,

    #[arg(long, default_value_t = 8)]
    requests: usize,

    #[arg(long, default_value = "abcdefghij")]
    password: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let client = Client::new();
    let url = format!("{}/api/bootstrap", args.base_url.trim_end_matches('/'));

    let tasks: Vec<_> = (0..args.requests)
        .map(|i| {
            let client = client.clone();
            let url = url.clone();
            let payload = json!({
                "email": format!("admin{i}@example.com"),
                "password": args.password,
                "passwordConfirm": args.password,
            });

            tokio::spawn(async move { client.post(&url).json(&payload).send().await })
        })
        .collect();

    let mut successes = 0;
    let mut conflicts = 0;
    let mut others = Vec::new();

    for task in tasks {
        let response = task.await??;

        match response.status() {
            StatusCode::OK => successes += 1,
            StatusCode::CONFLICT => conflicts += 1,
            status => others.push((status, response.text().await.unwrap_or_default())),
        }
    }

    println!("Successes: {successes}");
    println!("Conflicts: {conflicts}");
    for (status, body) in &others {
        println!("Unexpected {status}: {body}");
    }

    if successes > 1 {
        bail!("{successes} registrations succeeded, expected at most one");
    }

    Ok(())
}
