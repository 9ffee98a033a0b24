use super::{json_pretty, print_warning, Failure, EXIT_SUCCESS};
use simbox_core::{open_session, LifecycleCommand, SessionConfig};
use simbox_runtime::{Confirmer, SystemProbe, SystemRunner};

pub fn run(
    config: SessionConfig,
    command: &LifecycleCommand,
    confirm: &dyn Confirmer,
    json: bool,
) -> Result<u8, Failure> {
    let runner = SystemRunner;
    let mut session = open_session(config, &SystemProbe, &runner)?;
    let outcome = session.dispatch(command, confirm)?;

    if json {
        println!("{}", json_pretty(&outcome)?);
    } else {
        for warning in &outcome.warnings {
            print_warning(warning);
        }
    }
    Ok(EXIT_SUCCESS)
}
