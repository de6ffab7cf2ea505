//! User-Friendly Error Formatting
//!
//! Provides user-friendly error messages with troubleshooting hints
//! for common error scenarios.

use std::fmt::Write;

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    // Match on the whole chain; context layers hide the root cause
    let error_msg = format!("{:#}", error);

    if error_msg.contains("X11 connection") || error_msg.contains("DISPLAY") {
        format_x11_error(&mut output, &error_msg);
    } else if error_msg.contains("RandR") {
        format_randr_error(&mut output, &error_msg);
    } else if error_msg.contains("D-Bus") {
        format_dbus_error(&mut output, &error_msg);
    } else if error_msg.contains("config") {
        format_config_error(&mut output, &error_msg);
    } else {
        format_generic_error(&mut output, &error_msg);
    }

    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();

    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run with --verbose for detailed logs: lamco-hidpi-daemon -vv"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Inspect the computed plan: lamco-hidpi-daemon --print-plan"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Report issues: https://github.com/lamco-admin/lamco-hidpi-daemon/issues"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();

    output
}

fn format_x11_error(output: &mut String, _error: &str) {
    writeln!(output, "X Server Connection Error").ok();
    writeln!(output).ok();
    writeln!(output, "Could not connect to the X server.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Not running inside an X11 session").ok();
    writeln!(output, "     → echo $XDG_SESSION_TYPE (should be 'x11')").ok();
    writeln!(output, "     → Wayland sessions scale displays themselves").ok();
    writeln!(output).ok();
    writeln!(output, "  2. DISPLAY is unset or wrong").ok();
    writeln!(output, "     → echo $DISPLAY").ok();
    writeln!(output, "     → Or pass: lamco-hidpi-daemon --display :0").ok();
    writeln!(output).ok();
    writeln!(output, "  3. Started before the session was ready").ok();
    writeln!(
        output,
        "     → Start from the session autostart, not a system unit"
    )
    .ok();
}

fn format_randr_error(output: &mut String, _error: &str) {
    writeln!(output, "RandR Error").ok();
    writeln!(output).ok();
    writeln!(output, "The X server rejected a display configuration request.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. RandR 1.3 or newer is not available").ok();
    writeln!(output, "     → Run: xrandr --version").ok();
    writeln!(output).ok();
    writeln!(output, "  2. The configuration changed during the request").ok();
    writeln!(output, "     → Usually transient; the next event retries").ok();
    writeln!(output).ok();
    writeln!(output, "  3. Screen size limit exceeded").ok();
    writeln!(output, "     → Run: xrandr | head -1 (see 'maximum')").ok();
}

fn format_dbus_error(output: &mut String, _error: &str) {
    writeln!(output, "Session Bus Error").ok();
    writeln!(output).ok();
    writeln!(output, "Could not use the D-Bus session bus.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. No session bus in this environment").ok();
    writeln!(output, "     → echo $DBUS_SESSION_BUS_ADDRESS").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Another daemon owns the bus name").ok();
    writeln!(output, "     → Run: busctl --user list | grep hidpi").ok();
    writeln!(output, "     → Or disable it: [notify] enabled = false").ok();
}

fn format_config_error(output: &mut String, _error: &str) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with configuration file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Invalid TOML syntax").ok();
    writeln!(output, "     → Check for typos, missing quotes, etc.").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Invalid values").ok();
    writeln!(output, "     → gpu.vendor: auto, intel or nvidia").ok();
    writeln!(output, "     → settle delays: at most 10000 ms").ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Daemon Error").ok();
    writeln!(output).ok();
    writeln!(output, "An error occurred while running the daemon.").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
    writeln!(output).ok();
    writeln!(output, "Troubleshooting:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Check the detected GPU path in the startup log").ok();
    writeln!(output, "     → Override with: --vendor intel|nvidia").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Check the preference schema is installed:").ok();
    writeln!(output, "     → gsettings list-keys com.system76.hidpi").ok();
}
