//! Interactive client for driving the frozen process clock over a REPL.
//!
//! The client supports freezing the clock at a chosen instant, ticking the
//! active freeze by signed durations, jumping to absolute instants, nesting
//! and releasing freezes, and an optional auto-tick mode that advances the
//! frozen clock on a real-time interval.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use clap::Parser;
use timefreeze::FreezeHandle;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{watch, Mutex};
use tokio::time;

#[derive(Debug, Parser)]
#[command(author, version, about = "Interactive frozen-clock client")]
struct Args {
    /// Seconds of frozen time advanced per auto-tick (may be negative)
    #[arg(short = 'r', long, default_value_t = 1)]
    tick_rate: i64,

    /// Milliseconds between auto-ticks when ticking is enabled
    #[arg(short = 'i', long, default_value_t = 1_000)]
    interval_ms: u64,

    /// Optional instant to freeze at before the REPL starts
    #[arg(long)]
    freeze_at: Option<String>,
}

#[derive(Debug)]
enum ReplCommand {
    Freeze(DateTime<Utc>),
    Tick(Duration),
    MoveTo(DateTime<Utc>),
    Release,
    Now,
    Depth,
    Start,
    Stop,
    Rate(i64),
    Help,
    Quit,
}

/// Parses an instant from RFC 3339 or a plain `YYYY-MM-DD HH:MM:SS` form.
/// The plain form is interpreted as UTC.
fn parse_instant(input: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| format!("unrecognized instant '{input}' (try 2012-01-14 01:02:03)"))
}

fn parse_repl_command(line: &str) -> Result<ReplCommand, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Err("empty input".to_string());
    }

    let mut parts = trimmed.splitn(2, ' ');
    let command = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match command.to_lowercase().as_str() {
        "now" => Ok(ReplCommand::Now),
        "depth" => Ok(ReplCommand::Depth),
        "release" | "unfreeze" => Ok(ReplCommand::Release),
        "start" => Ok(ReplCommand::Start),
        "stop" => Ok(ReplCommand::Stop),
        "help" => Ok(ReplCommand::Help),
        "quit" | "exit" => Ok(ReplCommand::Quit),
        "freeze" => parse_instant(rest).map(ReplCommand::Freeze),
        "move" => parse_instant(rest).map(ReplCommand::MoveTo),
        "tick" => {
            let seconds = rest
                .parse::<i64>()
                .map_err(|_| "usage: tick <signed seconds>".to_string())?;
            Ok(ReplCommand::Tick(Duration::seconds(seconds)))
        }
        "rate" => {
            let rate = rest
                .parse::<i64>()
                .map_err(|_| "usage: rate <non-zero signed seconds>".to_string())?;
            if rate == 0 {
                return Err("tick rate must be non-zero".to_string());
            }
            Ok(ReplCommand::Rate(rate))
        }
        other => Err(format!("unknown command '{other}'")),
    }
}

type SharedFreezes = Arc<Mutex<Vec<FreezeHandle>>>;

/// Advances the innermost freeze by the configured rate whenever ticking is
/// enabled. The watch channel doubles as a shutdown signal: the loop exits
/// when the sender side is dropped.
async fn tick_loop(
    freezes: SharedFreezes,
    mut ticking: watch::Receiver<bool>,
    interval: StdDuration,
    rate: Arc<Mutex<i64>>,
) {
    let mut interval_timer = time::interval(interval);
    loop {
        tokio::select! {
            _ = interval_timer.tick() => {
                if *ticking.borrow() {
                    let seconds = *rate.lock().await;
                    let mut guard = freezes.lock().await;
                    if let Some(handle) = guard.last_mut() {
                        match handle.tick(Duration::seconds(seconds)) {
                            Ok(instant) => println!("[auto-tick] {instant}"),
                            Err(err) => eprintln!("auto-tick failed: {err}"),
                        }
                    }
                }
            }
            changed = ticking.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
}

fn print_help() {
    println!(
        r#"available commands:
  freeze <instant>      - begin a freeze (RFC 3339 or 'YYYY-MM-DD HH:MM:SS', UTC)
  tick <seconds>        - advance the innermost freeze by signed seconds
  move <instant>        - jump the innermost freeze to an absolute instant
  release | unfreeze    - end the innermost freeze
  now                   - print the current instant (frozen or real)
  depth                 - print the number of active nested freezes
  start                 - begin auto-ticking on the configured interval
  stop                  - pause auto-ticking
  rate <seconds>        - set the auto-tick rate (non-zero, may be negative)
  help                  - show this message
  quit | exit           - release all freezes and terminate"#
    );
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.tick_rate == 0 {
        anyhow::bail!("tick rate must be non-zero");
    }

    let freezes: SharedFreezes = Arc::new(Mutex::new(Vec::new()));
    if let Some(target) = args.freeze_at.as_deref() {
        let instant = parse_instant(target).map_err(anyhow::Error::msg)?;
        freezes.lock().await.push(timefreeze::freeze(instant));
        println!("clock frozen at {instant}");
    }

    let rate = Arc::new(Mutex::new(args.tick_rate));
    let (tick_sender, tick_receiver) = watch::channel(false);
    let tick_interval = StdDuration::from_millis(args.interval_ms);
    tokio::spawn(tick_loop(
        freezes.clone(),
        tick_receiver,
        tick_interval,
        rate.clone(),
    ));

    println!("Interactive frozen-clock client ready. Type 'help' for commands.");
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    while let Some(line) = lines.next_line().await? {
        let parsed = match parse_repl_command(&line) {
            Ok(cmd) => cmd,
            Err(err) => {
                eprintln!("{err}");
                continue;
            }
        };

        match parsed {
            ReplCommand::Freeze(instant) => {
                freezes.lock().await.push(timefreeze::freeze(instant));
                println!(
                    "clock frozen at {instant} (depth {})",
                    timefreeze::freeze_depth()
                );
            }
            ReplCommand::Tick(delta) => {
                let mut guard = freezes.lock().await;
                match guard.last_mut() {
                    Some(handle) => match handle.tick(delta) {
                        Ok(instant) => println!("ticked to {instant}"),
                        Err(err) => eprintln!("tick failed: {err}"),
                    },
                    None => eprintln!("no active freeze; use 'freeze <instant>' first"),
                }
            }
            ReplCommand::MoveTo(instant) => {
                let mut guard = freezes.lock().await;
                match guard.last_mut() {
                    Some(handle) => match handle.move_to(instant) {
                        Ok(moved) => println!("moved to {moved}"),
                        Err(err) => eprintln!("move failed: {err}"),
                    },
                    None => eprintln!("no active freeze; use 'freeze <instant>' first"),
                }
            }
            ReplCommand::Release => {
                let mut guard = freezes.lock().await;
                match guard.pop() {
                    Some(mut handle) => match handle.end() {
                        Ok(()) => {
                            println!("freeze released; current instant: {}", timefreeze::now());
                        }
                        Err(err) => eprintln!("release failed: {err}"),
                    },
                    None => eprintln!("no active freeze to release"),
                }
            }
            ReplCommand::Now => {
                let tag = if timefreeze::is_frozen() { "frozen" } else { "real" };
                println!("[{tag}] {}", timefreeze::now());
            }
            ReplCommand::Depth => {
                println!("active freezes: {}", timefreeze::freeze_depth());
            }
            ReplCommand::Start => {
                let _ = tick_sender.send(true);
                println!("auto-ticking started (interval: {tick_interval:?})");
            }
            ReplCommand::Stop => {
                let _ = tick_sender.send(false);
                println!("auto-ticking stopped");
            }
            ReplCommand::Rate(seconds) => {
                *rate.lock().await = seconds;
                println!("auto-tick rate updated to {seconds}s per tick");
            }
            ReplCommand::Help => print_help(),
            ReplCommand::Quit => break,
        }
    }

    // Unwind any remaining freezes innermost-first so the real clock is
    // restored before exit.
    let mut guard = freezes.lock().await;
    while let Some(mut handle) = guard.pop() {
        let _ = handle.end();
    }

    println!("shutting down client");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_instants_in_both_accepted_forms() {
        let expected = Utc.with_ymd_and_hms(2012, 1, 14, 1, 2, 3).unwrap();
        assert_eq!(parse_instant("2012-01-14 01:02:03").unwrap(), expected);
        assert_eq!(parse_instant("2012-01-14T01:02:03Z").unwrap(), expected);
        assert!(parse_instant("not-a-date").is_err());
    }

    #[test]
    fn parses_repl_commands_and_usage_errors() {
        assert!(matches!(
            parse_repl_command("tick -3600"),
            Ok(ReplCommand::Tick(delta)) if delta == Duration::seconds(-3600)
        ));
        assert!(matches!(
            parse_repl_command("freeze 2012-01-14 01:59:59"),
            Ok(ReplCommand::Freeze(_))
        ));
        assert!(matches!(
            parse_repl_command("release"),
            Ok(ReplCommand::Release)
        ));
        assert!(parse_repl_command("rate 0").is_err());
        assert!(parse_repl_command("tick soon").is_err());
        assert!(parse_repl_command("").is_err());
    }
}
