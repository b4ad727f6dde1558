//! Unified-diff hunk parser
//!
//! Line-oriented and stateless. Text without a valid `@@` header produces no
//! hunks, which is the normal result for a file without changes.

use super::Hunk;

/// Parse the unified diff of a single file into hunks
pub fn parse_hunks(file_path: &str, diff: &str, is_staged: bool) -> Vec<Hunk> {
    let mut hunks = Vec::new();
    let mut current: Option<(HunkHeader, Vec<&str>)> = None;

    for line in diff.lines() {
        if let Some(header) = parse_header(line) {
            if let Some((prev, body)) = current.take() {
                hunks.push(prev.into_hunk(file_path, &body, is_staged));
            }
            current = Some((header, Vec::new()));
            continue;
        }

        // A new file section ends the current hunk
        if line.starts_with("diff --git ") {
            if let Some((prev, body)) = current.take() {
                hunks.push(prev.into_hunk(file_path, &body, is_staged));
            }
            continue;
        }

        if let Some((_, ref mut body)) = current {
            body.push(line);
        }
    }

    if let Some((prev, body)) = current.take() {
        hunks.push(prev.into_hunk(file_path, &body, is_staged));
    }

    hunks
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HunkHeader {
    old_start: u32,
    old_lines: u32,
    new_start: u32,
    new_lines: u32,
}

impl HunkHeader {
    fn into_hunk(self, file_path: &str, body: &[&str], is_staged: bool) -> Hunk {
        let mut end = body.len();
        while end > 0 && body[end - 1].is_empty() {
            end -= 1;
        }

        Hunk::new(
            file_path,
            self.old_start,
            self.old_lines,
            self.new_start,
            self.new_lines,
            body[..end].join("\n"),
            is_staged,
        )
    }
}

/// Parse `@@ -old[,oldLines] +new[,newLines] @@`
fn parse_header(line: &str) -> Option<HunkHeader> {
    let rest = line.strip_prefix("@@ -")?;
    let (ranges, _) = rest.split_once(" @@")?;
    let (old, new) = ranges.split_once(" +")?;

    let (old_start, old_lines) = parse_range(old)?;
    let (new_start, new_lines) = parse_range(new)?;

    Some(HunkHeader {
        old_start,
        old_lines,
        new_start,
        new_lines,
    })
}

fn parse_range(range: &str) -> Option<(u32, u32)> {
    match range.split_once(',') {
        Some((start, lines)) => Some((start.parse().ok()?, lines.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}
