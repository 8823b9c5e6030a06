//! Platform mechanisms behind the action kinds

use std::{
    io::Write,
    process::{Output, Stdio},
};
use notify_rust::Notification;
use tokio::process::Command;
use tracing::debug;

async fn run(program: &str, args: &[&str]) -> Result<Output, String> {
    debug!("Executing {} {:?}", program, args);

    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("Failed to execute {}: {}", program, e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "{} exited with {}: {}",
            program,
            output.status,
            stderr.trim()
        ));
    }

    Ok(output)
}

/// Show a desktop notification
pub async fn send_notification(title: &str, message: &str) -> Result<(), String> {
    let mut notification = Notification::new();
    notification
        .summary(title)
        .body(message)
        .appname("timekeeper")
        .icon("alarm-clock");

    // Delivery talks to the notification daemon synchronously
    tokio::task::spawn_blocking(move || {
        notification
            .show()
            .map(|_| ())
            .map_err(|e| format!("Failed to show notification: {}", e))
    })
    .await
    .map_err(|e| format!("Notification task failed: {}", e))?
}

/// Play a sound file with the platform player
pub async fn play_sound_file(path: &str) -> Result<(), String> {
    if cfg!(windows) {
        let script = format!("(New-Object Media.SoundPlayer {:?}).PlaySync()", path);
        run("powershell", &["-NoProfile", "-Command", &script]).await?;
    } else if cfg!(target_os = "macos") {
        run("afplay", &[path]).await?;
    } else {
        run("aplay", &["-q", path]).await?;
    }
    Ok(())
}

/// Ring the terminal bell
pub fn terminal_bell() {
    let mut stdout = std::io::stdout();
    // Nothing else to fall back to if the terminal is gone
    let _ = stdout.write_all(b"\x07");
    let _ = stdout.flush();
}

/// Run a command line through the platform shell
pub async fn run_shell(command_line: &str) -> Result<Output, String> {
    if cfg!(windows) {
        run("cmd", &["/C", command_line]).await
    } else {
        run("sh", &["-c", command_line]).await
    }
}
