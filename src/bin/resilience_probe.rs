//! resilience-probe: 用 YAML 选项驱动弹性客户端的命令行探针
//!
//! Usage:
//!   resilience-probe run [--config <file>] [--url <url>] [--requests <n>] [--fail <n>]
//!   resilience-probe show-config [--config <file>]

use anyhow::{bail, Context};
use resilient_http::fake::{FailThenSucceedTransport, LOCALHOST};
use resilient_http::{ClientBuilder, ClientOptions, ResilientClient};
use std::sync::Arc;
use std::time::Instant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .try_init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "run" => cmd_run(&args[2..]).await,
        "show-config" => cmd_show_config(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("resilience-probe {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"resilience-probe: drive a resilient client from an options file

USAGE:
    resilience-probe <COMMAND> [OPTIONS]

COMMANDS:
    run                         Send requests and print every outcome
        --config <file>         YAML client options (default: built-in defaults)
        --url <url>             Real target; without it a local fake is used
        --requests <n>          Number of sequential requests (default 5)
        --fail <n>              Fake only: first n calls answer 500 (default 1)
    show-config                 Print the effective options as YAML
    version                     Show version information
    help                        Show this help message

ENVIRONMENT:
    RESILIENT_HTTP_*            Option overrides (see ClientOptions)
    RUST_LOG                    Log filter"#
    );
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
}

fn parse_flag<T: std::str::FromStr>(args: &[String], name: &str, default: T) -> anyhow::Result<T> {
    match flag(args, name) {
        Some(raw) => match raw.parse() {
            Ok(v) => Ok(v),
            Err(_) => bail!("invalid value for {name}: {raw}"),
        },
        None => Ok(default),
    }
}

fn load_options(args: &[String]) -> anyhow::Result<ClientOptions> {
    let options = match flag(args, "--config") {
        Some(path) => ClientOptions::from_yaml_file(path)
            .with_context(|| format!("loading options from {path}"))?,
        None => ClientOptions::default(),
    };
    let options = options.with_env_overrides();
    options.validate()?;
    Ok(options)
}

fn cmd_show_config(args: &[String]) -> anyhow::Result<()> {
    let options = load_options(args)?;
    print!("{}", options.to_yaml_string()?);
    Ok(())
}

async fn cmd_run(args: &[String]) -> anyhow::Result<()> {
    let mut options = load_options(args)?;
    let requests: usize = parse_flag(args, "--requests", 5)?;
    let target = flag(args, "--url").map(str::to_string);

    let mut fake = None;
    let client: ResilientClient = match &target {
        Some(_) => ClientBuilder::from_options("probe", &options)?.build()?,
        None => {
            let fail: usize = parse_flag(args, "--fail", 1)?;
            if options.base_url.is_none() {
                options.base_url = Some(LOCALHOST.to_string());
            }
            let transport = Arc::new(FailThenSucceedTransport::new(fail));
            fake = Some(transport.clone());
            ClientBuilder::from_options("probe", &options)?
                .shared_transport(transport)
                .build()?
        }
    };

    let path = target.as_deref().unwrap_or("probe");
    let started = Instant::now();
    let mut succeeded = 0usize;
    for i in 1..=requests {
        match client.get(path).await {
            Ok(resp) => {
                succeeded += 1;
                println!("#{i}: {}", resp.status());
            }
            Err(e) => println!("#{i}: {} ({})", e, e.class()),
        }
    }

    println!();
    println!(
        "{succeeded}/{requests} succeeded in {}ms",
        started.elapsed().as_millis()
    );
    if let Some(fake) = fake {
        println!("transport calls: {}", fake.calls());
    }
    let signals = client.signals();
    if let Some(cb) = signals.circuit_breaker {
        println!(
            "circuit breaker: {:?}, {} consecutive failures",
            cb.state, cb.consecutive_failures
        );
    }
    if let Some(rl) = signals.rate_limiter {
        println!("rate limiter: {:.2}/{} tokens", rl.tokens, rl.capacity);
    }
    Ok(())
}
