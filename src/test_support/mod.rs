//! Helpers shared by unit tests that drive external tools.

/// Stand-in for yt-dlp: writes `ID3-fake-audio` to the `--output` template
/// with `mp3` as the extension and prints a title.
pub const FAKE_YT_DLP: &str = r#"out=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output) out="$2"; shift ;;
  esac
  shift
done
file=$(echo "$out" | sed 's/%(ext)s/mp3/')
printf 'ID3-fake-audio' > "$file"
echo "Demo Title"
"#;

/// Stand-in for the whisper CLI: always transcribes to "hello world".
pub const FAKE_WHISPER: &str = r#"audio="$1"; shift
dir=""
while [ $# -gt 0 ]; do
  case "$1" in
    --output_dir) dir="$2"; shift ;;
  esac
  shift
done
stem=$(basename "$audio"); stem="${stem%.*}"
printf '{"text": " hello world", "segments": [], "language": "en"}' > "$dir/$stem.json"
"#;

/// Write an executable `/bin/sh` script standing in for an external tool
#[cfg(unix)]
pub fn write_script(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
