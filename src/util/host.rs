use gethostname::gethostname;

/// Host name of this machine as used for snapshot tagging and session
/// ownership checks. A trailing `.local` (macOS Bonjour suffix) is dropped.
pub fn local_hostname() -> String {
    let full = gethostname().to_string_lossy().into_owned();
    strip_local_suffix(&full).to_string()
}

fn strip_local_suffix(name: &str) -> &str {
    name.strip_suffix(".local").unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bonjour_suffix() {
        assert_eq!(strip_local_suffix("laptop.local"), "laptop");
        assert_eq!(strip_local_suffix("server"), "server");
    }
}
