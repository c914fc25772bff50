/// Returns the operating-system tag carried in presence frames.
pub fn os_tag() -> &'static str {
    os_tag_inner()
}

#[cfg(target_os = "windows")]
fn os_tag_inner() -> &'static str {
    "windows"
}

#[cfg(target_os = "macos")]
fn os_tag_inner() -> &'static str {
    "darwin"
}

#[cfg(target_os = "linux")]
fn os_tag_inner() -> &'static str {
    "linux"
}

#[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
fn os_tag_inner() -> &'static str {
    "unknown"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_tag_is_recognized() {
        assert!(["windows", "darwin", "linux", "unknown"].contains(&os_tag()));
    }
}
