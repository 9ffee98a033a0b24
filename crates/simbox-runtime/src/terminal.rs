use std::io::{IsTerminal, Write};

const OSC_START: &str = "\x1b]777;";
const OSC_END: &str = "\x1b\\";

/// Tell terminals that track container sessions that one has begun.
fn emit_container_push(container: &str, backend: &str) {
    let marker = format!("{OSC_START}container;push;{container};{backend};{container}{OSC_END}");
    let mut err = std::io::stderr();
    let _ = err.write_all(marker.as_bytes());
    let _ = err.flush();
}

fn emit_container_pop() {
    let marker = format!("{OSC_START}container;pop;;{OSC_END}");
    let mut err = std::io::stderr();
    let _ = err.write_all(marker.as_bytes());
    let _ = err.flush();
}

pub fn print_session_banner(container: &str, profile: &str, backend: &str) {
    if is_interactive_terminal() {
        emit_container_push(container, backend);
        eprintln!(
            "\x1b[1;36m[simbox]\x1b[0m entering \x1b[1m{container}\x1b[0m (profile {profile}) via {backend}"
        );
    }
}

pub fn print_session_exit(container: &str) {
    if is_interactive_terminal() {
        emit_container_pop();
        eprintln!("\x1b[1;36m[simbox]\x1b[0m left {container}");
    }
}

fn is_interactive_terminal() -> bool {
    std::io::stderr().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banners_dont_panic() {
        // Output depends on whether stderr is a terminal
        print_session_banner("isaac-lab-base", "base", "docker");
        print_session_exit("isaac-lab-base");
    }
}
