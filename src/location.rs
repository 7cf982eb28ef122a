use arcstr::ArcStr;
use miette::LabeledSpan;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Point {
    // 0-based
    pub offset: u32,
    // 0-based
    pub row: u32,
    // 0-based
    pub column: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Span {
    #[default]
    None,
    At {
        start: Point,
        end: Point,
        file: FileName,
    },
}

pub trait Spanning {
    fn span(&self) -> Span;
}

impl Span {
    pub fn points(&self) -> Option<(Point, Point)> {
        match self {
            Self::None => None,
            Self::At { start, end, .. } => Some((*start, *end)),
        }
    }

    pub fn file(&self) -> Option<FileName> {
        match self {
            Self::None => None,
            Self::At { file, .. } => Some(file.clone()),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "<unknown>"),
            Self::At { start, file, .. } => {
                write!(f, "{}:{}:{}", file, start.row + 1, start.column + 1)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileName(pub ArcStr);

impl FileName {
    pub const BATCH: Self = FileName(arcstr::literal!("batched.x"));
    pub const LITERAL: Self = FileName(arcstr::literal!("<literal>"));
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileName {
    fn from(path: &str) -> Self {
        FileName(path.into())
    }
}

impl From<String> for FileName {
    fn from(path: String) -> Self {
        FileName(path.into())
    }
}

impl From<&Path> for FileName {
    fn from(path: &Path) -> Self {
        (&*path.to_string_lossy()).into()
    }
}

impl From<PathBuf> for FileName {
    fn from(path: PathBuf) -> Self {
        path.as_path().into()
    }
}

/// Maps byte offsets of one source text to row/column points.
pub struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            source
                .bytes()
                .enumerate()
                .filter(|(_, byte)| *byte == b'\n')
                .map(|(offset, _)| offset as u32 + 1),
        );
        Self { line_starts }
    }

    pub fn point(&self, offset: usize) -> Point {
        let offset = offset as u32;
        let row = match self.line_starts.binary_search(&offset) {
            Ok(row) => row,
            Err(next) => next - 1,
        };
        Point {
            offset,
            row: row as u32,
            column: offset - self.line_starts[row],
        }
    }

    pub fn span(&self, range: std::ops::Range<usize>, file: &FileName) -> Span {
        Span::At {
            start: self.point(range.start),
            end: self.point(range.end),
            file: file.clone(),
        }
    }
}

pub fn labels_from_span(code: &str, span: &Span) -> Vec<LabeledSpan> {
    let Some((start, end)) = span.points() else {
        return Vec::new();
    };
    let start = (start.offset as usize).min(code.len());
    let end = (end.offset as usize).clamp(start, code.len());
    vec![LabeledSpan::underline(start..end)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_index_rows_and_columns() {
        let index = LineIndex::new("fn f() {\n  u8:1\n}\n");
        assert_eq!(
            index.point(11),
            Point {
                offset: 11,
                row: 1,
                column: 2
            }
        );
        assert_eq!(index.point(0).row, 0);
        assert_eq!(index.point(16).row, 2);
    }

    #[test]
    fn spans_display_one_based() {
        let index = LineIndex::new("ab\ncdefgh");
        let span = index.span(4..6, &FileName::from("t.x"));
        assert_eq!(span.to_string(), "t.x:2:2");
        assert_eq!(Span::None.to_string(), "<unknown>");
    }

    #[test]
    fn labels_are_clamped_to_the_source() {
        let span = LineIndex::new("abc").span(1..9, &FileName::BATCH);
        let labels = labels_from_span("abc", &span);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].offset(), 1);
        assert_eq!(labels[0].len(), 2);
    }
}
