//! Entry point for the clouddeck watcher: tails a backend's push feed and
//! prints a rolling summary of everything the adapters accumulate.

use std::env;
use std::time::Duration;

use clouddeck::profiles::{
    load_profiles, save_profiles, ProfileEntry, ProfileRequest, ResolveProfile,
};
use clouddeck::{
    AlertsAdapter, ClientConfig, DeploymentsAdapter, LogsAdapter, MetricsAdapter,
    RealtimeService, SystemStatusAdapter,
};

struct ParsedArgs {
    url: Option<String>,
    project: Option<String>,
    deployment: Option<String>,
    profile: Option<String>,
    save: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "clouddeck".into());
    let mut url: Option<String> = None;
    let mut project: Option<String> = None;
    let mut deployment: Option<String> = None;
    let mut profile: Option<String> = None;
    let mut save = false;

    let usage = || {
        format!(
            "Usage: {prog} [--project ID|-p ID] [--deployment ID|-d ID] [--profile NAME|-P NAME] [--save] [ws://HOST:PORT/ws]"
        )
    };

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(usage()),
            "--project" | "-p" => {
                project = it.next();
            }
            "--deployment" | "-d" => {
                deployment = it.next();
            }
            "--profile" | "-P" => {
                profile = it.next();
            }
            "--save" => {
                save = true;
            }
            _ if arg.starts_with("--project=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        project = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with("--deployment=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        deployment = Some(v.to_string());
                    }
                }
            }
            _ if arg.starts_with("--profile=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        profile = Some(v.to_string());
                    }
                }
            }
            _ => {
                if url.is_none() {
                    url = Some(arg);
                } else {
                    return Err(format!("Unexpected argument. {}", usage()));
                }
            }
        }
    }
    Ok(ParsedArgs {
        url,
        project,
        deployment,
        profile,
        save,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            return Ok(());
        }
    };

    let profiles = load_profiles();
    let req = ProfileRequest {
        profile_name: parsed.profile.clone(),
        url: parsed.url.clone(),
    };
    let url = match req.resolve(&profiles) {
        ResolveProfile::Direct(url) => {
            if let Some(name) = parsed.profile.as_ref() {
                let mut profiles = profiles.clone();
                let entry = ProfileEntry { url: url.clone() };
                let known = profiles.profiles.get(name);
                if known.is_none() || (parsed.save && known != Some(&entry)) {
                    profiles.profiles.insert(name.clone(), entry);
                    if let Err(e) = save_profiles(&profiles) {
                        eprintln!("could not save profile '{name}': {e}");
                    }
                } else if known != Some(&entry) {
                    eprintln!("profile '{name}' differs; pass --save to overwrite");
                }
            }
            url
        }
        ResolveProfile::Loaded(url) => url,
        ResolveProfile::Select(names) => {
            eprintln!("No URL given. Known profiles:");
            for name in names {
                eprintln!("  {name}");
            }
            eprintln!("Run again with --profile NAME or a ws:// URL.");
            return Ok(());
        }
        ResolveProfile::Missing(name) => {
            eprintln!("Profile '{name}' does not exist; pass a ws:// URL to create it.");
            return Ok(());
        }
        ResolveProfile::None => {
            eprintln!("No URL provided and no profiles saved.");
            return Ok(());
        }
    };

    let config = ClientConfig::new(url.as_str())?;
    let service = RealtimeService::new(config);

    let status = SystemStatusAdapter::new(&service);
    let deployments = DeploymentsAdapter::new(&service);
    let alerts = AlertsAdapter::new(&service);
    let metrics = parsed
        .project
        .as_deref()
        .map(|id| MetricsAdapter::new(&service, id));
    let logs = parsed
        .deployment
        .as_deref()
        .map(|id| LogsAdapter::new(&service, id));

    println!("watching {url} (Ctrl-C to quit)");
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                print_summary(&service, &status, &deployments, &alerts, metrics.as_ref(), logs.as_ref());
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn print_summary(
    service: &RealtimeService,
    status: &SystemStatusAdapter,
    deployments: &DeploymentsAdapter,
    alerts: &AlertsAdapter,
    metrics: Option<&MetricsAdapter>,
    logs: Option<&LogsAdapter>,
) {
    let link = if service.is_connected() {
        "connected"
    } else {
        "disconnected"
    };
    let platform = status
        .status()
        .map(|s| s.status)
        .unwrap_or_else(|| "unknown".into());

    let mut line = format!(
        "[{link}] status={platform} deployments={} alerts={}",
        deployments.deployments().len(),
        alerts.alerts().len()
    );
    if let Some(m) = metrics {
        line.push_str(&format!(" metrics={}", if m.latest().is_some() { "fresh" } else { "none" }));
    }
    if let Some(l) = logs {
        line.push_str(&format!(" logs={}", l.entries().len()));
        if let Some(newest) = l.entries().first() {
            line.push_str(&format!(" | {}", newest.message));
        }
    }
    if let Some(err) = alerts.last_error() {
        line.push_str(&format!(" | last error: {err}"));
    }
    println!("{line}");
}
