//! Helpers shared by unit tests.

use std::path::{Path, PathBuf};

/// Writes an executable `/bin/sh` script standing in for yt-dlp.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Netscape cookie jar that passes the size threshold and the offline diagnostic.
pub fn sample_cookies() -> String {
    let mut content = String::from("# Netscape HTTP Cookie File\n");
    for name in ["SID", "HSID", "SSID", "APISID", "SAPISID"] {
        content.push_str(&format!(
            ".youtube.com\tTRUE\t/\tTRUE\t9999999999\t{}\tvalue_{}\n",
            name, name
        ));
    }
    content
}
