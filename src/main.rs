use anyhow::Result;
use kle_ble_sdk::domain::models::{CommandKind, MessageSeverity, SessionEvent};
use kle_ble_sdk::domain::settings::SettingsService;
use kle_ble_sdk::infrastructure::bluetooth::btleplug_platform::BtleplugPlatform;
use kle_ble_sdk::infrastructure::bluetooth::{platform_channel, SessionHandle};
use kle_ble_sdk::infrastructure::logging;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

const HELP: &str = "commands: scan [target] | trip | end | cmd <ignition-on|ignition-off|immobilize-on|immobilize-off> | state | quit";

#[tokio::main]
async fn main() -> Result<()> {
    let mut settings = SettingsService::new()?;
    let _logging = logging::init_logger(&settings.get().log_settings)?;
    info!("Starting KLE SDK test console ({})", settings.path().display());

    let (events, inbox) = platform_channel();
    let platform = BtleplugPlatform::with_default_adapter(events, settings.get().gatt.clone()).await?;
    let session = SessionHandle::spawn(settings.get().session_config(), platform, inbox);
    let mut stream = session.subscribe().await?;

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            event = stream.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !run_command(&session, &mut settings, line.trim()).await {
                    break;
                }
            }
        }
    }

    session.shutdown();
    Ok(())
}

/// Returns false when the user asked to quit
async fn run_command(session: &SessionHandle, settings: &mut SettingsService, line: &str) -> bool {
    let (verb, arg) = match line.split_once(char::is_whitespace) {
        Some((verb, arg)) => (verb, arg.trim()),
        None => (line, ""),
    };

    let result = match verb {
        "" => Ok(()),
        "quit" | "exit" => return false,
        "scan" => {
            let target = match (arg, settings.get().last_target.clone()) {
                ("", Some(last)) => last,
                (target, _) => target.to_string(),
            };
            info!("Scanning target: {}", target);
            let result = session.start_scan(&target).await;
            if result.is_ok() {
                if let Err(e) = settings.remember_target(target.trim()) {
                    warn!("Could not save settings: {:#}", e);
                }
            }
            result
        }
        "trip" => {
            info!("Starting trip");
            session.start_trip().await
        }
        "end" => {
            info!("Ending trip");
            session.end_trip().await
        }
        "cmd" => match arg.parse::<CommandKind>() {
            Ok(command) => session.send_command(command).await,
            Err(e) => {
                warn!("{}", e);
                Ok(())
            }
        },
        "state" => session.snapshot().await.map(|snapshot| {
            let state = snapshot.state;
            info!(
                "State: {} (scan: {}, trip: {}, commands: {})",
                state,
                state.can_start_scan(),
                state.can_start_trip(),
                state.can_send_commands()
            );
        }),
        _ => {
            println!("{}", HELP);
            Ok(())
        }
    };

    if let Err(e) = result {
        warn!("Rejected: {}", e);
    }
    true
}

fn log_event(event: &SessionEvent) {
    let status = event.to_status();
    match status.severity {
        MessageSeverity::Error => error!("{}", status.message),
        MessageSeverity::Warning => warn!("{}", status.message),
        MessageSeverity::Info | MessageSeverity::Success => info!("{}", status.message),
    }
}
