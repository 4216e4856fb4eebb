use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets
    const DISPLAY_ENVS: [&str; 20] = [
        "RUST_LOG",
        "PAYGATE_HOST",
        "PAYGATE_PORT",
        "PAYGATE_DATABASE_URL",
        "PAYGATE_RUN_MIGRATIONS",
        "PAYGATE_SWEEP_INTERVAL",
        "PAYGATE_POLL_INTERVAL",
        "PAYGATE_EXPLORER_TIMEOUT",
        "PAYGATE_HISTORY_LOOKUP_LIMIT",
        "PAYGATE_QR_PAYLOAD",
        "PAYGATE_QR_TTL",
        "PAYGATE_COIN_A_EXPLORER_URL",
        "PAYGATE_COIN_A_ADDRESS",
        "PAYGATE_COIN_A_DECIMALS",
        "PAYGATE_COIN_A_TTL",
        "PAYGATE_COIN_A_MIN_CONFIRMATIONS",
        "PAYGATE_COIN_B_EXPLORER_URL",
        "PAYGATE_COIN_B_ADDRESS",
        "PAYGATE_COIN_B_TTL",
        "PAYGATE_COIN_B_MIN_CONFIRMATIONS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
