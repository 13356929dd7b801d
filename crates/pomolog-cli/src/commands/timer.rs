use chrono::Utc;
use clap::Subcommand;
use pomolog_core::{Sequencer, SqliteLog, Strategy, TimerDriver, TimerState};
use std::time::Duration;

use super::{open_session, submit, CliResult};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start the next pomodoro of a workitem
    Start {
        workitem: String,
        /// Work seconds (0 keeps the pomodoro's own duration)
        #[arg(long, default_value = "0")]
        work: f64,
        /// Rest seconds (0 keeps the pomodoro's own duration)
        #[arg(long, default_value = "0")]
        rest: f64,
    },
    /// End the work phase early and start resting
    Rest {
        workitem: String,
        #[arg(long, default_value = "0")]
        rest: f64,
    },
    /// Cancel the running pomodoro
    Void { workitem: String },
    /// Apply due phase ends and print the timer state as JSON
    Status,
    /// Keep applying phase ends as they come due
    Watch {
        /// Seconds between evaluations
        #[arg(long, default_value = "1")]
        interval: u64,
        /// Stop once no pomodoro is running
        #[arg(long)]
        until_idle: bool,
    },
}

fn evaluate(seq: &mut Sequencer<SqliteLog>, driver: &mut TimerDriver) -> CliResult {
    for transition in driver.evaluate(seq, Utc::now())? {
        println!("{}", serde_json::to_string(&transition)?);
    }
    Ok(())
}

async fn watch(seq: &mut Sequencer<SqliteLog>, interval: u64, until_idle: bool) -> CliResult {
    let mut driver = TimerDriver::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                evaluate(seq, &mut driver)?;
                if until_idle && driver.state() == TimerState::Idle {
                    break;
                }
            }
            _ = &mut ctrl_c => break,
        }
    }
    Ok(())
}

pub fn run(action: TimerAction) -> CliResult {
    match action {
        TimerAction::Start {
            workitem,
            work,
            rest,
        } => submit(Strategy::StartWork {
            workitem_uid: workitem,
            work_duration: work,
            rest_duration: rest,
        }),
        TimerAction::Rest { workitem, rest } => submit(Strategy::StartRest {
            workitem_uid: workitem,
            rest_duration: rest,
        }),
        TimerAction::Void { workitem } => submit(Strategy::VoidPomodoro {
            workitem_uid: workitem,
        }),
        TimerAction::Status => {
            let mut seq = open_session()?;
            let mut driver = TimerDriver::new();
            evaluate(&mut seq, &mut driver)?;

            let now = Utc::now();
            let snapshot = serde_json::json!({
                "state": driver.state(),
                "workitem": driver.workitem_uid(),
                "remaining": driver.remaining(seq.tenant(), seq.actor(), now),
                "next_due": driver.next_due(seq.tenant(), seq.actor()),
            });
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        TimerAction::Watch {
            interval,
            until_idle,
        } => {
            let mut seq = open_session()?;
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(watch(&mut seq, interval, until_idle))
        }
    }
}
