use crate::commands::common::Workspace;
use crate::error::CliError;

pub fn run_stats(workspace: &Workspace, as_json: bool) -> Result<(), CliError> {
    let stats = workspace.store().stats()?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Categories  {}", stats.categories);
        println!("Dictionary  {}", stats.dictionary);
        println!("Phrases     {}", stats.phrases);
    }
    Ok(())
}
