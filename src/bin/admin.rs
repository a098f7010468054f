use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;

use storage_service::infra::{BackendFactory, BackendRegistry, SqlBackendFactory};
use storage_service::processor::subjects;
use storage_service::server;

fn print_help() {
    eprintln!(
        "\
storage-service-admin

USAGE:
  storage-service-admin <command> [options]

COMMANDS:
  check-config                    Parse database records and list subjects
  check-backends                  Connect to every configured database engine
  send-event                      Publish an event and print the reported state

check-config / check-backends OPTIONS:
  --databases <records>           (defaults to env DATABASES)
                                  alias:dbtype:hostname:port:username:password;...

send-event OPTIONS:
  --nats-url <url>                (defaults to env NATS_URL)
  --nats-token <token>            (defaults to env NATS_TOKEN)
  --dbtype <mysql|mariadb|pgsql>  (required)
  --alias <alias>                 (required)
  --payload <json>                (required) Event body
  --timeout-secs <n>              (default: 30) How long to wait for the state
"
    );
}

fn next_value(args: &mut VecDeque<String>, flag: &str) -> anyhow::Result<String> {
    args.pop_front()
        .ok_or_else(|| anyhow::anyhow!("missing value for {flag}"))
}

fn parse_databases_args(args: &mut VecDeque<String>) -> anyhow::Result<Option<BackendRegistry>> {
    let mut databases: Option<String> = None;
    while let Some(arg) = args.pop_front() {
        match arg.as_str() {
            "--databases" => databases = Some(next_value(args, "--databases")?),
            "-h" | "--help" => {
                print_help();
                return Ok(None);
            }
            other => anyhow::bail!("unexpected argument: {other}"),
        }
    }

    let databases = databases
        .or_else(|| std::env::var("DATABASES").ok())
        .ok_or_else(|| anyhow::anyhow!("DATABASES is required (or pass --databases)"))?;
    Ok(Some(BackendRegistry::parse(&databases)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: VecDeque<String> = std::env::args().skip(1).collect();
    let Some(command) = args.pop_front() else {
        print_help();
        return Ok(());
    };

    if matches!(command.as_str(), "-h" | "--help" | "help") {
        print_help();
        return Ok(());
    }

    match command.as_str() {
        "check-config" => {
            let Some(registry) = parse_databases_args(&mut args)? else {
                return Ok(());
            };

            for (key, config) in registry.iter() {
                println!(
                    "{key} -> {}:{} (user {})",
                    config.hostname, config.port, config.username
                );
                println!(
                    "  events: {}",
                    subjects::events(key.dbtype.as_str(), &key.alias)
                );
                println!(
                    "  states: {}",
                    subjects::states(key.dbtype.as_str(), &key.alias)
                );
            }
            println!("ok: {} backend(s) configured", registry.len());
            Ok(())
        }
        "check-backends" => {
            let Some(registry) = parse_databases_args(&mut args)? else {
                return Ok(());
            };

            let factory = SqlBackendFactory;
            let mut failed = 0usize;
            for (key, config) in registry.iter() {
                let backend = factory.build(config);
                match backend.check_connection().await {
                    Ok(()) => println!("ok: {key} ({}:{})", config.hostname, config.port),
                    Err(e) => {
                        failed += 1;
                        println!("error: {key} ({}:{}): {e}", config.hostname, config.port);
                    }
                }
            }

            if failed > 0 {
                anyhow::bail!("{failed} of {} backend(s) unreachable", registry.len());
            }
            Ok(())
        }
        "send-event" => {
            let mut nats_url: Option<String> = None;
            let mut nats_token: Option<String> = None;
            let mut dbtype: Option<String> = None;
            let mut alias: Option<String> = None;
            let mut payload: Option<String> = None;
            let mut timeout_secs: u64 = 30;

            while let Some(arg) = args.pop_front() {
                match arg.as_str() {
                    "--nats-url" => nats_url = Some(next_value(&mut args, "--nats-url")?),
                    "--nats-token" => nats_token = Some(next_value(&mut args, "--nats-token")?),
                    "--dbtype" => dbtype = Some(next_value(&mut args, "--dbtype")?),
                    "--alias" => alias = Some(next_value(&mut args, "--alias")?),
                    "--payload" => payload = Some(next_value(&mut args, "--payload")?),
                    "--timeout-secs" => {
                        timeout_secs = next_value(&mut args, "--timeout-secs")?.parse()?;
                    }
                    "-h" | "--help" => {
                        print_help();
                        return Ok(());
                    }
                    other => anyhow::bail!("unexpected argument: {other}"),
                }
            }

            let nats_url = nats_url
                .or_else(|| std::env::var("NATS_URL").ok())
                .ok_or_else(|| anyhow::anyhow!("NATS_URL is required (or pass --nats-url)"))?;
            let nats_token = nats_token.or_else(|| std::env::var("NATS_TOKEN").ok());
            let dbtype = dbtype.ok_or_else(|| anyhow::anyhow!("--dbtype is required"))?;
            let alias = alias.ok_or_else(|| anyhow::anyhow!("--alias is required"))?;
            let payload = payload.ok_or_else(|| anyhow::anyhow!("--payload is required"))?;

            serde_json::from_str::<serde_json::Value>(&payload)
                .map_err(|e| anyhow::anyhow!("--payload is not valid JSON: {e}"))?;

            let client = server::connect(&nats_url, nats_token.as_deref()).await?;

            let states = subjects::states(&dbtype, &alias);
            let events = subjects::events(&dbtype, &alias);

            let mut subscriber = client.subscribe(states.clone()).await?;
            client.publish(events.clone(), Bytes::from(payload)).await?;
            client.flush().await?;
            eprintln!("sent event to {events}, waiting on {states}");

            match tokio::time::timeout(Duration::from_secs(timeout_secs), subscriber.next()).await
            {
                Ok(Some(message)) => {
                    println!("{}", String::from_utf8_lossy(&message.payload));
                    Ok(())
                }
                Ok(None) => anyhow::bail!("subscription to {states} closed"),
                Err(_) => anyhow::bail!("no state received on {states} within {timeout_secs}s"),
            }
        }
        other => {
            print_help();
            anyhow::bail!("unknown command: {other}");
        }
    }
}
