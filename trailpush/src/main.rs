#![warn(rust_2018_idioms)]

#[macro_use]
extern crate slog_scope;

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use docopt::Docopt;
use serde::Deserialize;

use trailpush::error::{PushError, PushErrorKind, PushResult};
use trailpush::metrics::metrics_from_settings;
use trailpush::notifier::{NotificationService, NotifyReport};
use trailpush::routers::webpush::WebPushRouter;
use trailpush::settings::{Settings, ENV_PREFIX};
use trailpush::subscriber::{deactivate, load_subscribers, save_subscribers, Subscriber};
use trailpush::trail::{Trail, TrailStatus};
use trailpush::vapid::token::{verify, Token};
use trailpush::vapid::{KeyPair, VapidHeader, VapidSigner};
use trailpush_common::logging;

const USAGE: &str = "
Trail status push notifications.

Usage:
    trailpush genkeys [--output=FILE] [--config=FILE]
    trailpush check [--endpoint=URL] [--config=FILE]
    trailpush notify --trail=ID --name=NAME --status=STATUS [--old-status=STATUS] [--notes=TEXT] [--updated-by=NAME] [--subscribers=FILE] [--prune] [--config=FILE]
    trailpush test [--subscribers=FILE] [--config=FILE]
    trailpush stats [--subscribers=FILE] [--config=FILE]
    trailpush (-h | --help)
    trailpush --version

Options:
    -h, --help              Show this message.
    --version               Show the version.
    --config=FILE           Configuration file path.
    --output=FILE           Also write the new keys to FILE as a config snippet.
    --endpoint=URL          Endpoint used to pick the sample audience [default: https://fcm.googleapis.com/fcm/send/check].
    --trail=ID              Numeric id of the trail that changed.
    --name=NAME             Trail name.
    --status=STATUS         New status: open, caution or closed.
    --old-status=STATUS     Previous status.
    --notes=TEXT            Notes appended to the notification body.
    --updated-by=NAME       Who changed the status.
    --subscribers=FILE      JSON subscriber list, overrides `subscribers_file`.
    --prune                 Mark subscribers the push service reports as gone inactive.
";

#[derive(Debug, Deserialize)]
struct Args {
    cmd_genkeys: bool,
    cmd_check: bool,
    cmd_notify: bool,
    cmd_test: bool,
    cmd_stats: bool,
    flag_config: Option<String>,
    flag_output: Option<String>,
    flag_endpoint: String,
    flag_trail: Option<u64>,
    flag_name: Option<String>,
    flag_status: Option<String>,
    flag_old_status: Option<String>,
    flag_notes: Option<String>,
    flag_updated_by: Option<String>,
    flag_subscribers: Option<String>,
    flag_prune: bool,
}

fn main() {
    let args: Args = Docopt::new(USAGE)
        .and_then(|d| {
            d.version(Some(env!("CARGO_PKG_VERSION").to_owned()))
                .deserialize()
        })
        .unwrap_or_else(|e| e.exit());

    // Configure sentry error capture. Reads `SENTRY_DSN`.
    let sentry_guard = sentry::init(sentry::ClientOptions {
        release: sentry::release_name!(),
        ..sentry::ClientOptions::default()
    });

    let code = match run(&args) {
        Ok(()) => 0,
        Err(e) => report_fatal(&e),
    };
    logging::reset_logging();
    // `process::exit` runs no destructors: flush queued events first.
    drop(sentry_guard);
    process::exit(code);
}

fn report_fatal(e: &PushError) -> i32 {
    sentry::capture_error(e);
    error!("Fatal error"; "error" => e.kind.to_string(), "kind" => e.kind.as_metric());
    eprintln!("Error: {e}");
    1
}

fn run(args: &Args) -> PushResult<()> {
    let settings = Settings::with_env_and_config_file(&args.flag_config)?;
    logging::init_logging(
        !settings.human_logs,
        logging::get_default_hostname(ENV_PREFIX),
    )?;
    debug!("Starting up...");

    if args.cmd_genkeys {
        genkeys(args.flag_output.as_deref())
    } else if args.cmd_check {
        check(&settings, &args.flag_endpoint)
    } else if args.cmd_notify {
        notify(args, &settings)
    } else if args.cmd_test {
        let (service, subscribers, _) = prepare(args, &settings)?;
        let report = service.send_test(&subscribers)?;
        println!("{report}");
        Ok(())
    } else if args.cmd_stats {
        let (service, subscribers, _) = prepare(args, &settings)?;
        println!(
            "{}",
            serde_json::to_string_pretty(&service.stats(&subscribers))?
        );
        Ok(())
    } else {
        Ok(())
    }
}

fn genkeys(output: Option<&str>) -> PushResult<()> {
    let pair = KeyPair::generate()?;
    let snippet = format!(
        "vapid_public_key = \"{}\"\nvapid_private_key = \"{}\"\n",
        pair.public_key_b64(),
        pair.private_key_b64()
    );
    print!("{snippet}");

    if let Some(path) = output {
        // Never clobber an existing key file.
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(snippet.as_bytes())?;
        info!("🔐 Wrote VAPID keys"; "path" => path);
    }
    Ok(())
}

fn check(settings: &Settings, endpoint: &str) -> PushResult<()> {
    let pair = require_keys(settings)?;
    let audience = settings.audience_table().resolve(endpoint)?;
    let token = VapidSigner::new(&settings.vapid_subject).sign(&audience.uri, &pair)?;
    let claims = verify(&Token::parse(&token.to_string())?, pair.public_point())?;
    let header = VapidHeader::new(&token, &pair.public_key_b64());

    println!("Public key:   {}", pair.public_key_b64());
    println!("Subject:      {}", claims.sub);
    println!("Audience:     {} ({})", claims.aud, audience.provider.as_str());
    println!("Expires:      {}", claims.exp);
    println!(
        "Header shape: vapid t=<{} chars>, k=<{} chars>",
        header.token.len(),
        header.public_key.len()
    );
    println!("Signature verified.");
    Ok(())
}

fn notify(args: &Args, settings: &Settings) -> PushResult<()> {
    let missing = |flag: &str| PushErrorKind::Configuration(format!("--{flag} is required"));
    let status: TrailStatus = args
        .flag_status
        .as_deref()
        .ok_or_else(|| missing("status"))?
        .parse()?;
    let old_status = args
        .flag_old_status
        .as_deref()
        .map(str::parse::<TrailStatus>)
        .transpose()?;
    let trail = Trail {
        id: args.flag_trail.ok_or_else(|| missing("trail"))?,
        name: args.flag_name.clone().ok_or_else(|| missing("name"))?,
        status,
        notes: args.flag_notes.clone(),
        updated_by: args.flag_updated_by.clone(),
    };

    let (service, mut subscribers, path) = prepare(args, settings)?;
    let report = service.notify_status_change(&trail, old_status, &subscribers)?;
    println!("{report}");

    if args.flag_prune {
        prune(&path, &mut subscribers, &report)?;
    }
    Ok(())
}

fn prune(path: &Path, subscribers: &mut [Subscriber], report: &NotifyReport) -> PushResult<()> {
    let gone = report.gone_endpoints();
    if gone.is_empty() {
        return Ok(());
    }
    let changed = deactivate(subscribers, &gone);
    save_subscribers(path, subscribers)?;
    info!("📋 Deactivated gone subscribers"; "count" => changed);
    Ok(())
}

fn require_keys(settings: &Settings) -> PushResult<KeyPair> {
    settings.key_pair()?.ok_or_else(|| {
        PushErrorKind::Configuration(
            "VAPID keys are not configured, run `trailpush genkeys`".to_owned(),
        )
        .into()
    })
}

/// Build the notification service and load the subscriber list.
fn prepare(
    args: &Args,
    settings: &Settings,
) -> PushResult<(NotificationService, Vec<Subscriber>, PathBuf)> {
    let path = args
        .flag_subscribers
        .clone()
        .or_else(|| settings.subscribers_file.clone())
        .map(PathBuf::from)
        .ok_or_else(|| {
            PushErrorKind::Configuration(
                "no subscriber list, pass --subscribers or set subscribers_file".to_owned(),
            )
        })?;
    let subscribers = load_subscribers(&path)?;

    let http = reqwest::blocking::Client::builder()
        .build()
        .map_err(|e| PushErrorKind::Configuration(format!("Could not build HTTP client: {e}")))?;
    let metrics = metrics_from_settings(settings)
        .map_err(|e| PushErrorKind::Configuration(format!("Could not start metrics: {e}")))?;
    let router = WebPushRouter::new(settings, http, metrics);
    let service = NotificationService::new(settings, Box::new(router), settings.key_pair()?);
    Ok((service, subscribers, path))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sentry::test::TestTransport;

    use super::*;

    #[test]
    fn fatal_errors_are_sent_to_sentry() {
        let transport = TestTransport::new();
        let guard = sentry::init(sentry::ClientOptions {
            dsn: Some("https://public@sentry.invalid/1".parse().unwrap()),
            transport: Some(Arc::new(transport.clone())),
            ..Default::default()
        });

        let err: PushError = PushErrorKind::Configuration("no keys".to_owned()).into();
        assert_eq!(report_fatal(&err), 1);
        drop(guard);

        let events = transport.fetch_and_clear_events();
        assert_eq!(events.len(), 1);
        assert!(events[0]
            .exception
            .values
            .iter()
            .any(|e| e.value.as_deref().unwrap_or_default().contains("no keys")));
    }

    #[test]
    fn usage_parses() {
        let args: Args = Docopt::new(USAGE)
            .and_then(|d| {
                d.argv([
                    "trailpush",
                    "notify",
                    "--trail=5",
                    "--name=Harbison",
                    "--status=closed",
                ])
                .deserialize()
            })
            .unwrap();
        assert!(args.cmd_notify);
        assert_eq!(args.flag_trail, Some(5));
        assert_eq!(
            args.flag_endpoint,
            "https://fcm.googleapis.com/fcm/send/check"
        );
        assert!(!args.flag_prune);
    }
}
