use std::fmt::Debug;
use std::io;
use std::path::Path;

/// One line of the kernel mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub source: String,
    pub target: String,
    pub fs_type: String,
}

/// Read-only view of running processes and active mounts.
pub trait ProcessInspector: Send + Sync + Debug {
    /// Number of live processes whose command line names `name`.
    fn count_processes(&self, name: &str) -> usize;

    fn mounts(&self) -> io::Result<Vec<MountEntry>>;
}

/// Inspector backed by `/proc`.
#[derive(Debug, Clone, Default)]
pub struct ProcInspector;

impl ProcessInspector for ProcInspector {
    fn count_processes(&self, name: &str) -> usize {
        let entries = match std::fs::read_dir("/proc") {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("failed to list /proc: {}", e);
                return 0;
            }
        };

        entries
            .filter_map(Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|n| n.bytes().all(|b| b.is_ascii_digit()))
            })
            .filter_map(|entry| std::fs::read(entry.path().join("cmdline")).ok())
            .filter(|cmdline| cmdline_mentions(cmdline, name))
            .count()
    }

    fn mounts(&self) -> io::Result<Vec<MountEntry>> {
        let contents = std::fs::read_to_string("/proc/mounts")?;
        Ok(parse_mounts(&contents))
    }
}

/// Whether any argument of a NUL separated command line is `name`,
/// either verbatim or as the file name of a path.
pub(crate) fn cmdline_mentions(cmdline: &[u8], name: &str) -> bool {
    cmdline
        .split(|b| *b == 0)
        .filter_map(|arg| std::str::from_utf8(arg).ok())
        .any(|arg| arg == name || Path::new(arg).file_name().is_some_and(|f| f == name))
}

pub(crate) fn parse_mounts(contents: &str) -> Vec<MountEntry> {
    contents
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let source = fields.next()?;
            let target = fields.next()?;
            let fs_type = fields.next()?;
            Some(MountEntry {
                source: unescape(source),
                target: unescape(target),
                fs_type: fs_type.to_string(),
            })
        })
        .collect()
}

/// Undo the octal escapes (`\040` and friends) used in `/proc/mounts`.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|d| (b'0'..=b'7').contains(d)) {
                let value = digits.iter().fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                if let Ok(byte) = u8::try_from(value) {
                    out.push(byte);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
