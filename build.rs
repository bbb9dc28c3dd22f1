use std::process::Command;

fn main() {
    let version = get_version();
    println!("cargo:rustc-env=RELAYPROXY_VERSION={}", version);
    println!("cargo:rerun-if-changed=.git/HEAD");
}

fn get_version() -> String {
    let attempts: [&[&str]; 2] = [&["describe", "--tags", "--always", "--dirty"], &["rev-parse", "--short", "HEAD"]];

    for args in attempts {
        if let Ok(output) = Command::new("git").args(args).output() {
            if output.status.success() {
                let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !version.is_empty() {
                    return version;
                }
            }
        }
    }

    env!("CARGO_PKG_VERSION").to_string()
}
