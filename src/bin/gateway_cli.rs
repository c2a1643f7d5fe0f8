//! Gateway CLI: 缓存键归一化、配置检查与限流模拟的命令行工具
//!
//! Usage:
//!   gateway-cli normalize <topic> [--variant <v>] [--locale <l>]   Print the cache key digest
//!   gateway-cli config [--file <path>]                             Print the resolved configuration
//!   gateway-cli simulate [--identifier <id>] [--calls <n>]          Run calls through an in-process gateway

use ai_lib_gateway::cache::{canonical_topic, KeyNormalizer};
use ai_lib_gateway::gateway::{Handler, HandlerOutput};
use ai_lib_gateway::{Gateway, GatewayConfig, GatewayRequest};
use anyhow::Context;
use async_trait::async_trait;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "normalize" => cmd_normalize(&args[2..]),
        "config" => cmd_config(&args[2..]),
        "simulate" => cmd_simulate(&args[2..]).await,
        "version" | "--version" | "-V" => {
            cmd_version();
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
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"gateway-cli: 请求准入网关命令行工具

USAGE:
    gateway-cli <COMMAND> [OPTIONS]

COMMANDS:
    normalize <topic> [--variant <v>] [--locale <l>]
                                Print the canonical topic and its cache key digest
    config [--file <path>]      Print the resolved configuration as YAML
    simulate [--identifier <id>] [--calls <n>] [--endpoint <path>] [--file <path>]
                                Run calls through an in-process gateway and print decisions
    version                     Show version information
    help                        Show this help message

ENVIRONMENT:
    GATEWAY_*                   Configuration overrides (e.g. GATEWAY_REQUESTS_PER_MINUTE)
    RUST_LOG                    Log filter (default: info)"#
    );
}

fn cmd_version() {
    println!("gateway-cli {}", env!("CARGO_PKG_VERSION"));
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn positional(args: &[String]) -> Option<&str> {
    let mut skip = false;
    for arg in args {
        if skip {
            skip = false;
            continue;
        }
        if arg.starts_with("--") {
            skip = true;
            continue;
        }
        return Some(arg.as_str());
    }
    None
}

/// `--file` wins; otherwise defaults layered with `GATEWAY_*` variables.
fn load_config(args: &[String]) -> anyhow::Result<GatewayConfig> {
    match flag(args, "--file") {
        Some(path) => GatewayConfig::from_file(path)
            .with_context(|| format!("loading configuration from {path}")),
        None => GatewayConfig::from_env().context("reading GATEWAY_* environment"),
    }
}

fn cmd_normalize(args: &[String]) -> anyhow::Result<()> {
    let topic = positional(args).context("missing <topic>")?;
    let variant = flag(args, "--variant").unwrap_or("lesson");
    let locale = flag(args, "--locale").unwrap_or("en");

    println!("canonical: {}", canonical_topic(topic));
    println!("key:       {}", KeyNormalizer::new().normalize(topic, variant, locale));
    Ok(())
}

fn cmd_config(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

/// Echoes the request and bills a fixed amount per call.
struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn invoke(&self, request: &GatewayRequest) -> anyhow::Result<HandlerOutput> {
        Ok(HandlerOutput::new(
            serde_json::json!({ "endpoint": request.endpoint }),
            0.02,
        ))
    }
}

async fn cmd_simulate(args: &[String]) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let identifier = flag(args, "--identifier").unwrap_or("cli");
    let endpoint = flag(args, "--endpoint").unwrap_or("/simulate");
    let calls: u32 = match flag(args, "--calls") {
        Some(n) => n.parse().with_context(|| format!("invalid --calls value {n:?}"))?,
        None => 5,
    };

    let builder = Gateway::builder(config);
    #[cfg(feature = "redis")]
    let builder = builder.connect_redis().await;
    let gateway = builder.build()?;
    let request = GatewayRequest::get(endpoint).with_caller(identifier);

    for i in 1..=calls {
        match gateway.call(&request, &EchoHandler).await {
            Ok(resp) => println!(
                "#{i:<4} allowed  burst={:<5} cached={:<5} remaining/min={}",
                resp.admission.burst_used, resp.admission.cached, resp.admission.remaining.minute
            ),
            Err(e) if e.is_rejected() => {
                let retry = e
                    .admission_headers()
                    .and_then(|h| h.retry_after_seconds)
                    .unwrap_or(0);
                println!("#{i:<4} rejected retry_after={retry}s");
            }
            Err(e) => return Err(e.into()),
        }
    }

    let snapshot = gateway.snapshot().await;
    gateway.close();
    println!();
    println!("{}", serde_json::to_string_pretty(&snapshot.costs)?);
    Ok(())
}
