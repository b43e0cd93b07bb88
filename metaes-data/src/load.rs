//! Load
//! ---
//!
//! Reads classification data in a libsvm-like text format:
//!
//! ```text
//! <label> <index>:<value> <index>:<value> ... # comment
//! ```
//!
//! Indices are zero-based and missing indices are zero.  Labels are arbitrary tokens;
//! the distinct labels, sorted, become the one-hot classes.
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};

use rayon::prelude::*;
use tracing::info;

use crate::dataset::LabeledSet;
use crate::{DataError, Result};

/// Given a line, outputs the label and dense feature vector.  Returns `Ok(None)` for
/// blank and comment-only lines.
pub fn parse_line(line: &str, dims: usize) -> std::result::Result<Option<(String, Vec<f32>)>, String> {
    // Remove comments
    let line = line.split('#').next().unwrap_or("");
    let mut pieces = line.split_whitespace();
    let label = match pieces.next() {
        Some(l) => l.to_string(),
        None => return Ok(None),
    };

    let mut x = vec![0f32; dims];
    for piece in pieces {
        let mut p = piece.splitn(2, ':');
        match (p.next(), p.next()) {
            (Some(idx), Some(val)) => {
                let idx: usize = idx
                    .parse()
                    .map_err(|_| format!("bad feature index `{}`", idx))?;
                let val: f32 = val
                    .parse()
                    .map_err(|_| format!("bad feature value `{}`", val))?;
                if idx >= dims {
                    return Err(format!("feature index {} out of range for {} dims", idx, dims));
                }
                x[idx] = val;
            }
            _ => return Err(format!("expected <index>:<value>, got `{}`", piece)),
        }
    }
    Ok(Some((label, x)))
}

/// Hard code buffersize for now
static BUFFER_SIZE: usize = 1000;

// Reads every labelled row, parsing in parallel in buffers of BUFFER_SIZE lines
fn read_rows<R: Read>(reader: R, dims: usize) -> Result<Vec<(usize, String, Vec<f32>)>> {
    let br = BufReader::new(reader);
    let mut rows = Vec::new();
    let mut buffer = Vec::with_capacity(BUFFER_SIZE);
    let mut tmp_results = Vec::with_capacity(BUFFER_SIZE);
    let mut it = br.lines();
    let mut line_no = 0;
    loop {
        buffer.clear();
        for _ in 0..BUFFER_SIZE {
            if let Some(line) = it.next() {
                buffer.push(line?);
            }
        }
        if buffer.is_empty() {
            break;
        }

        // Parse in parallel
        tmp_results.clear();
        buffer
            .par_iter()
            .map(|l| parse_line(l, dims))
            .collect_into_vec(&mut tmp_results);

        for res in tmp_results.drain(..) {
            line_no += 1;
            match res {
                Ok(Some((label, x))) => rows.push((line_no, label, x)),
                Ok(None) => (),
                Err(reason) => {
                    return Err(DataError::Parse {
                        line: line_no,
                        reason: reason,
                    })
                }
            }
        }
    }
    Ok(rows)
}

// One-hot encodes the rows against a sorted class list
fn encode(rows: Vec<(usize, String, Vec<f32>)>, classes: &[String]) -> Result<LabeledSet> {
    let mut x = Vec::with_capacity(rows.len());
    let mut labels = Vec::with_capacity(rows.len());
    for (line, label, row) in rows {
        match classes.iter().position(|c| *c == label) {
            Some(class) => labels.push(class),
            None => {
                return Err(DataError::Parse {
                    line: line,
                    reason: format!("unknown class `{}`", label),
                })
            }
        }
        x.push(row);
    }
    LabeledSet::from_classes(x, &labels, classes.len())
}

/// Reads a classification dataset from any reader.  Returns the dataset and the
/// class names in one-hot order.
pub fn read_classification_from<R: Read>(
    reader: R,
    dims: usize,
) -> Result<(LabeledSet, Vec<String>)> {
    let rows = read_rows(reader, dims)?;
    let classes: Vec<String> = rows
        .iter()
        .map(|(_, l, _)| l.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let ds = encode(rows, &classes)?;
    Ok((ds, classes))
}

/// Reads a dataset whose labels must come from `classes`, e.g. a validation set
/// encoded the same way as its training set.
pub fn read_with_classes<R: Read>(reader: R, dims: usize, classes: &[String]) -> Result<LabeledSet> {
    encode(read_rows(reader, dims)?, classes)
}

/// Given a file path, loads it into a dataset
pub fn read_classification(fname: &str, dims: usize) -> Result<(LabeledSet, Vec<String>)> {
    info!("Loading dataset at {}", fname);
    let f = File::open(fname)?;
    let (ds, classes) = read_classification_from(f, dims)?;
    info!("Examples: {}, Classes: {:?}", ds.len(), classes);
    Ok((ds, classes))
}

/// Given a file path, loads it into a dataset using existing classes
pub fn read_classification_with(fname: &str, dims: usize, classes: &[String]) -> Result<LabeledSet> {
    info!("Loading dataset at {}", fname);
    let ds = read_with_classes(File::open(fname)?, dims, classes)?;
    info!("Examples: {}", ds.len());
    Ok(ds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_line() {
        let parsed = parse_line("cat 0:1.5 2:-1 # a comment", 3).unwrap();
        assert_eq!(parsed, Some(("cat".to_string(), vec![1.5, 0.0, -1.0])));

        assert_eq!(parse_line("   # only a comment", 3).unwrap(), None);
        assert_eq!(parse_line("", 3).unwrap(), None);

        assert!(parse_line("cat 3:1.0", 3).is_err());
        assert!(parse_line("cat 1:x", 3).is_err());
        assert!(parse_line("cat 1", 3).is_err());
    }

    #[test]
    fn test_read_classification() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# header").unwrap();
        writeln!(file, "b 0:1 1:2").unwrap();
        writeln!(file, "a 1:3").unwrap();
        writeln!(file, "").unwrap();
        writeln!(file, "b 0:4").unwrap();
        file.flush().unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let (ds, classes) = read_classification(&path, 2).unwrap();
        assert_eq!(classes, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.x()[1], vec![0.0, 3.0]);
        assert_eq!(ds.y()[0], vec![0.0, 1.0]);
        assert_eq!(ds.y()[1], vec![1.0, 0.0]);
    }

    #[test]
    fn test_read_reports_line() {
        let data = "a 0:1\nb 0:1\nc 9:1\n";
        match read_classification_from(data.as_bytes(), 2) {
            Err(DataError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected: {:?}", other.map(|(ds, _)| ds.len())),
        }
    }

    #[test]
    fn test_missing_file() {
        match read_classification("/definitely/not/here.svm", 2) {
            Err(DataError::Io(_)) => (),
            other => panic!("unexpected: {:?}", other.map(|(ds, _)| ds.len())),
        }
    }

    #[test]
    fn test_read_with_classes() {
        let classes = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ds = read_with_classes("c 0:1\na 1:2\n".as_bytes(), 2, &classes).unwrap();
        assert_eq!(ds.y()[0], vec![0.0, 0.0, 1.0]);
        assert_eq!(ds.y()[1], vec![1.0, 0.0, 0.0]);

        match read_with_classes("a 0:1\n\nd 0:1\n".as_bytes(), 2, &classes) {
            Err(DataError::Parse { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected: {:?}", other.map(|ds| ds.len())),
        }
    }
}
