//! `siwx` inspection tool.
//!
//! ```text
//! siwx principal <public-key-der-hex>
//! siwx envelope <content-map-hex | @file>
//! siwx certificate <certificate-hex | @file> [label ...]
//! siwx session [status | clear]
//! ```
//!
//! Configuration comes from the `SIWX_*` environment variables; `session`
//! needs `SIWX_REDIS_URL`.

use std::env;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{error, info};
use siwx::certificate::{decode_envelope, request_id_of, Certificate, LookupResult};
use siwx::session::{KeyValueStorage, RedisStorage, SessionStore};
use siwx::time::{Clock, SystemClock};
use siwx::{Principal, SiwxConfig};

const USAGE: &str = "usage: siwx <principal|envelope|certificate|session> [args...]";

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let result = match command.as_str() {
        "principal" => principal(rest),
        "envelope" => envelope(rest),
        "certificate" => certificate(rest),
        "session" => session(rest).await,
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        error!("{} failed: {}", command, e);
        std::process::exit(1);
    }
}

/// Hex argument, or the contents of a file when prefixed with `@`.
fn read_input(arg: Option<&String>) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let arg = arg.ok_or(USAGE)?;
    match arg.strip_prefix('@') {
        Some(path) => Ok(std::fs::read(path)?),
        None => Ok(hex::decode(arg.trim())?),
    }
}

fn format_time(ns: u64) -> String {
    let secs = (ns / 1_000_000_000) as i64;
    let nanos = (ns % 1_000_000_000) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| format!("{}ns", ns))
}

fn principal(args: &[String]) -> CliResult {
    let der = read_input(args.first())?;
    println!("{}", Principal::self_authenticating(&der));
    Ok(())
}

fn envelope(args: &[String]) -> CliResult {
    let fields = decode_envelope(&read_input(args.first())?)?;
    println!("request_type:   {}", fields.request_type);
    println!("canister_id:    {}", fields.canister_id);
    println!("method_name:    {}", fields.method_name);
    println!("sender:         {}", fields.sender);
    println!("arg:            {} bytes", fields.arg.len());
    println!("ingress_expiry: {}", format_time(fields.ingress_expiry));
    if let Some(nonce) = &fields.nonce {
        println!("nonce:          {}", hex::encode(nonce));
    }
    println!("request_id:     {}", request_id_of(&fields));
    Ok(())
}

fn certificate(args: &[String]) -> CliResult {
    let certificate = Certificate::decode(&read_input(args.first())?)?;
    println!("root_hash:  {}", hex::encode(certificate.tree.digest()));
    match certificate.time()? {
        Some(ns) => println!("time:       {}", format_time(ns)),
        None => println!("time:       none"),
    }
    match &certificate.delegation {
        Some(delegation) => match Principal::from_slice(&delegation.subnet_id) {
            Some(subnet) => println!("delegation: subnet {}", subnet),
            None => println!("delegation: subnet {}", hex::encode(&delegation.subnet_id)),
        },
        None => println!("delegation: none"),
    }

    let path = args.get(1..).unwrap_or_default();
    if !path.is_empty() {
        let labels: Vec<&[u8]> = path.iter().map(|l| l.as_bytes()).collect();
        match certificate.lookup_path(&labels) {
            LookupResult::Found(value) => match std::str::from_utf8(value) {
                Ok(text) => println!("{}: {}", path.join("/"), text),
                Err(_) => println!("{}: 0x{}", path.join("/"), hex::encode(value)),
            },
            other => println!("{}: {:?}", path.join("/"), other),
        }
    }
    Ok(())
}

async fn session(args: &[String]) -> CliResult {
    let config = SiwxConfig::from_env()?;
    let url = config
        .redis_url
        .as_deref()
        .ok_or("SIWX_REDIS_URL is not set")?;
    let storage: Arc<dyn KeyValueStorage> = Arc::new(RedisStorage::open(url)?);
    let clock = Arc::new(SystemClock);
    let store = SessionStore::new(storage, clock.clone(), config.storage_prefix.clone());

    match args.first().map(String::as_str).unwrap_or("status") {
        "status" => {
            let identity = store.restore().await;
            match identity.delegation_chain() {
                Some(chain) => {
                    println!("sender:      {}", identity.sender());
                    println!("delegations: {}", chain.delegations().len());
                    println!("expires:     {}", format_time(chain.expiration()));
                    println!(
                        "remaining:   {}s",
                        chain.expiration().saturating_sub(clock.now_ns()) / 1_000_000_000
                    );
                }
                None => println!("no active session"),
            }
        }
        "clear" => {
            store.clear().await?;
            info!("Cleared session under prefix {}", config.storage_prefix);
        }
        other => return Err(format!("unknown session command {}", other).into()),
    }
    Ok(())
}
