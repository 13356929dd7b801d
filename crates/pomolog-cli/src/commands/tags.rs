use super::{open_session, CliResult};

pub fn run(json: bool) -> CliResult {
    let seq = open_session()?;
    let tags = seq
        .tenant()
        .user(seq.actor())
        .map(|user| user.tags())
        .unwrap_or_default();

    if json {
        println!("{}", serde_json::to_string_pretty(&tags)?);
        return Ok(());
    }
    for (tag, workitems) in &tags {
        println!("#{tag}\t{}", workitems.join(", "));
    }
    Ok(())
}
