use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use mobile_protocol::NodeSnapshot;
use mobile_server::client::{build_connector, fetch_status, load_ca_certificates};

#[derive(Debug, Clone)]
struct SimConfig {
    addr: SocketAddr,
    server_name: String,
    ca_cert: Option<PathBuf>,
    username: String,
    password: String,
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = parse_args()?;
    let ca_cert = cfg
        .ca_cert
        .as_ref()
        .context("--ca-cert is required")?;

    println!("[sim-client] connecting to {} ({})", cfg.addr, cfg.server_name);

    let connector = build_connector(load_ca_certificates(ca_cert)?)?;
    let response = tokio::time::timeout(
        Duration::from_millis(cfg.timeout_ms),
        fetch_status(
            &connector,
            cfg.addr,
            &cfg.server_name,
            &cfg.username,
            &cfg.password,
        ),
    )
    .await
    .context("timed out waiting for the server")??;

    match response {
        Some(tree) => {
            println!(
                "[sim-client] authenticated, {} nodes received",
                tree.node_count()
            );
            print_tree(&tree, 0);
        }
        None => {
            println!("[sim-client] authentication failed");
            std::process::exit(2);
        }
    }
    Ok(())
}

fn print_tree(node: &NodeSnapshot, depth: usize) {
    let indent = "  ".repeat(depth);
    match node.effective_message() {
        Some(message) => println!(
            "{}{} [{:?}] {}",
            indent, node.label, node.alert_level, message
        ),
        None => println!("{}{} [{:?}]", indent, node.label, node.alert_level),
    }
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}

fn parse_args() -> anyhow::Result<SimConfig> {
    let mut cfg = SimConfig {
        addr: SocketAddr::from(([127, 0, 0, 1], mobile_protocol::DEFAULT_PORT)),
        server_name: "localhost".to_string(),
        ca_cert: None,
        username: String::new(),
        password: String::new(),
        timeout_ms: 10_000,
    };

    let mut args = std::env::args().skip(1).peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--addr" => {
                let value = next_arg_value(&mut args, &arg)?;
                cfg.addr = SocketAddr::from_str(&value)
                    .with_context(|| format!("invalid --addr: {}", value))?;
            }
            "--server-name" => cfg.server_name = next_arg_value(&mut args, &arg)?,
            "--ca-cert" => cfg.ca_cert = Some(PathBuf::from(next_arg_value(&mut args, &arg)?)),
            "--username" => cfg.username = next_arg_value(&mut args, &arg)?,
            "--password" => cfg.password = next_arg_value(&mut args, &arg)?,
            "--timeout-ms" => {
                let value = next_arg_value(&mut args, &arg)?;
                cfg.timeout_ms = value
                    .parse::<u64>()
                    .with_context(|| format!("invalid --timeout-ms: {}", value))?;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                bail!("unknown argument: {}\nUse --help to list options.", other);
            }
        }
    }

    if cfg.username.is_empty() {
        bail!("--username is required");
    }

    Ok(cfg)
}

fn next_arg_value<I>(args: &mut std::iter::Peekable<I>, flag: &str) -> anyhow::Result<String>
where
    I: Iterator<Item = String>,
{
    args.next()
        .with_context(|| format!("missing value for {}", flag))
}

fn print_help() {
    println!(
        "sim-client --username <name> --password <secret> --ca-cert <pem>
           [--addr 127.0.0.1:4585] [--server-name localhost] [--timeout-ms 10000]"
    );
}
