// src/bin/s4.rs

//! The `s4` CLI: `rm`, `cp [-r]`, `ls [-r]`, `eval`, `map`, `map-to-n`,
//! `map-from-n`, `health`.

use anyhow::{Context, Result, anyhow, bail};
use s4::client::ClusterClient;
use s4::config;
use s4::core::fs_layout::{self, ListEntry};
use std::env;
use std::io::{Read, Write};
use std::path::Path;

#[tokio::main]
async fn main() {
    unsafe {
        env::set_var("LC_ALL", "C");
    }
    if let Err(e) = run().await {
        eprintln!("s4: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let config_path = take_flag_value(&mut args, "-c");
    let verb = if args.is_empty() {
        bail!("usage: s4 <rm|cp|ls|eval|map|map-to-n|map-from-n|health> [args...]");
    } else {
        args.remove(0)
    };

    let servers_file = config::resolve_servers_file(config_path.as_deref())?;
    let servers = config::load_servers(&servers_file)
        .with_context(|| format!("failed to load cluster membership from '{servers_file}'"))?;
    let client = ClusterClient::new(servers);

    match verb.as_str() {
        "rm" => cmd_rm(&client, &mut args).await,
        "cp" => cmd_cp(&client, &mut args).await,
        "ls" => cmd_ls(&client, &mut args).await,
        "eval" => cmd_eval(&client, &args).await,
        "map" => cmd_map(&client, "map", &args).await,
        "map-to-n" => cmd_map(&client, "map_to_n", &args).await,
        "map-from-n" => cmd_map(&client, "map_from_n", &args).await,
        "health" => cmd_health(&client).await,
        other => bail!("unknown verb '{other}'"),
    }
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    if let Some(i) = args.iter().position(|a| a == flag) {
        args.remove(i);
        true
    } else {
        false
    }
}

fn take_flag_value(args: &mut Vec<String>, flag: &str) -> Option<String> {
    let i = args.iter().position(|a| a == flag)?;
    args.remove(i);
    if i < args.len() { Some(args.remove(i)) } else { None }
}

async fn cmd_rm(client: &ClusterClient, args: &mut Vec<String>) -> Result<()> {
    let recursive = take_flag(args, "-r");
    let prefix = args.first().ok_or_else(|| anyhow!("rm requires a key/prefix"))?;
    for server in client.servers() {
        client
            .delete(server, prefix, recursive)
            .await
            .map_err(|e| anyhow!("{e}"))?;
    }
    Ok(())
}

async fn cmd_cp(client: &ClusterClient, args: &mut Vec<String>) -> Result<()> {
    let recursive = take_flag(args, "-r");
    if args.len() != 2 {
        bail!("cp requires exactly two arguments: <src> <dst>");
    }
    let src = args[0].clone();
    let dst = args[1].clone();

    match (src.as_str(), dst.as_str()) {
        ("-", d) => {
            let mut bytes = Vec::new();
            std::io::stdin().read_to_end(&mut bytes)?;
            put_key(client, d, bytes).await
        }
        (s, "-") => {
            let bytes = get_key(client, s).await?;
            std::io::stdout().write_all(&bytes)?;
            Ok(())
        }
        (s, d) if s.starts_with("s4://") && !d.starts_with("s4://") => {
            if recursive {
                download_recursive(client, s, d).await
            } else {
                let bytes = get_key(client, s).await?;
                if let Some(parent) = Path::new(d).parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(d, bytes)?;
                Ok(())
            }
        }
        (s, d) if !s.starts_with("s4://") && d.starts_with("s4://") => {
            if recursive {
                upload_recursive(client, s, d).await
            } else {
                let bytes = std::fs::read(s).with_context(|| format!("reading '{s}'"))?;
                put_key(client, d, bytes).await
            }
        }
        _ => bail!("cp requires exactly one of <src>/<dst> to be an s4:// key"),
    }
}

async fn put_key(client: &ClusterClient, key: &str, bytes: Vec<u8>) -> Result<()> {
    let server = client.server_for(key).map_err(|e| anyhow!("{e}"))?.to_string();
    client
        .put_bytes(&server, key, bytes)
        .await
        .map_err(|e| anyhow!("{e}"))
}

async fn get_key(client: &ClusterClient, key: &str) -> Result<Vec<u8>> {
    let server = client.server_for(key).map_err(|e| anyhow!("{e}"))?.to_string();
    client.get_bytes(&server, key).await.map_err(|e| anyhow!("{e}"))
}

async fn upload_recursive(client: &ClusterClient, local_dir: &str, dst_prefix: &str) -> Result<()> {
    let dst_prefix = if dst_prefix.ends_with('/') {
        dst_prefix.to_string()
    } else {
        format!("{dst_prefix}/")
    };
    let mut stack = vec![std::path::PathBuf::from(local_dir)];
    let root = std::path::PathBuf::from(local_dir);
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).with_context(|| format!("reading '{}'", dir.display()))? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let relative = path.strip_prefix(&root).unwrap_or(&path).to_string_lossy().replace('\\', "/");
            let key = format!("{dst_prefix}{relative}");
            let bytes = std::fs::read(&path)?;
            put_key(client, &key, bytes).await?;
        }
    }
    Ok(())
}

async fn download_recursive(client: &ClusterClient, src_prefix: &str, local_dir: &str) -> Result<()> {
    let rel_prefix = src_prefix.strip_prefix("s4://").unwrap_or(src_prefix);
    let (bucket, path_in_bucket) = rel_prefix.split_once('/').unwrap_or((rel_prefix, ""));

    let mut entries = Vec::new();
    for server in client.servers() {
        let rows = client
            .list(server, src_prefix, true)
            .await
            .map_err(|e| anyhow!("{e}"))?;
        entries.extend(rows);
    }
    let entries = fs_layout::merge_listing(entries, false);
    if entries.is_empty() {
        bail!("no objects found under '{src_prefix}'");
    }

    for entry in entries {
        let ListEntry::File { name, .. } = entry else { continue };
        let relative = name.strip_prefix(path_in_bucket).unwrap_or(&name).trim_start_matches('/');
        let key = format!("s4://{bucket}/{name}");
        let bytes = get_key(client, &key).await?;
        let dst_path = Path::new(local_dir).join(relative);
        if let Some(parent) = dst_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(dst_path, bytes)?;
    }
    Ok(())
}

async fn cmd_ls(client: &ClusterClient, args: &mut Vec<String>) -> Result<()> {
    let recursive = take_flag(args, "-r");
    let prefix = args.first().cloned().unwrap_or_else(|| "s4://".to_string());

    let mut entries: Vec<ListEntry> = Vec::new();
    let is_bucket_listing = prefix.trim_end_matches('/') == "s4:/" || prefix == "s4://";
    for server in client.servers() {
        let rows = if is_bucket_listing {
            client.list_buckets(server).await
        } else {
            client.list(server, &prefix, recursive).await
        }
        .map_err(|e| anyhow!("{e}"))?;
        entries.extend(rows);
    }
    let entries = fs_layout::merge_listing(entries, is_bucket_listing);

    if entries.is_empty() {
        bail!("no entries found under '{prefix}'");
    }

    for entry in &entries {
        match entry {
            ListEntry::File { date, time, size, name } => println!("{date} {time} {size:>10} {name}"),
            ListEntry::Dir { name } => println!("{:>10} {:>8} {:>10} {name}", "", "", "PRE"),
        }
    }
    Ok(())
}

async fn cmd_eval(client: &ClusterClient, args: &[String]) -> Result<()> {
    if args.len() < 2 {
        bail!("eval requires a key and a command");
    }
    let key = &args[0];
    let cmd = args[1..].join(" ");
    let server = client.server_for(key).map_err(|e| anyhow!("{e}"))?.to_string();
    let output = client.eval(&server, key, &cmd).await.map_err(|e| anyhow!("{e}"))?;
    print!("{output}");
    Ok(())
}

async fn cmd_map(client: &ClusterClient, route: &str, args: &[String]) -> Result<()> {
    if args.len() < 3 {
        bail!("{route} requires <indir> <outdir> <cmd>");
    }
    let indir = &args[0];
    let outdir = &args[1];
    let cmd = args[2..].join(" ");
    client
        .map_broadcast(route, &cmd, indir, outdir)
        .await
        .map_err(|e| anyhow!("{e}"))
}

async fn cmd_health(client: &ClusterClient) -> Result<()> {
    let mut failures = Vec::new();
    for server in client.servers() {
        if let Err(e) = client.health(server).await {
            failures.push(format!("{server}: {e}"));
        } else {
            println!("{server}: ok");
        }
    }
    if !failures.is_empty() {
        bail!("unhealthy servers:\n{}", failures.join("\n"));
    }
    Ok(())
}
