use pomolog_core::{PomodoroState, Workitem};

use super::{open_session, CliResult};

fn pomodoro_summary(workitem: &Workitem) -> String {
    format!(
        "{} finished, {} canceled, {} left",
        workitem.count_in_state(PomodoroState::Finished),
        workitem.count_in_state(PomodoroState::Canceled),
        workitem.startable_count()
    )
}

pub fn run(json: bool) -> CliResult {
    let seq = open_session()?;
    let tenant = seq.tenant();

    if json {
        println!("{}", serde_json::to_string_pretty(tenant)?);
        return Ok(());
    }

    for user in tenant.users().filter(|u| !u.is_system()) {
        println!("{} <{}>", user.name(), user.email());
        for backlog in user.backlogs() {
            println!("  {} ({})", backlog.name(), backlog.uid());
            for workitem in backlog.workitems() {
                println!(
                    "    [{}] {} ({}) {}",
                    workitem.state(),
                    workitem.name(),
                    workitem.uid(),
                    pomodoro_summary(workitem)
                );
            }
        }
    }
    Ok(())
}
