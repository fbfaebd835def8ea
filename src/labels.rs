use serde::Serialize;
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelsError {
    #[error("Failed to read labels file: {0}")]
    Io(#[from] io::Error),
    #[error("Invalid {field} value on line {line}")]
    InvalidChannel { field: &'static str, line: usize },
    #[error("Invalid line format on line {line}: {content}")]
    InvalidLine { line: usize, content: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorLabel {
    pub label: String,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

#[derive(Debug, Clone, Default)]
pub struct ClassLabels {
    labels: Vec<ColorLabel>,
}

impl ClassLabels {
    pub fn new(labels: Vec<ColorLabel>) -> Self {
        Self { labels }
    }

    pub fn load(path: &Path) -> Result<Self, LabelsError> {
        let file = File::open(path)?;
        Self::parse(io::BufReader::new(file))
    }

    /// Reads `label,r,g,b` lines. Blank lines are skipped.
    pub fn parse(reader: impl BufRead) -> Result<Self, LabelsError> {
        let mut labels = Vec::new();

        for (index, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let line_number = index + 1;
            if line.trim().is_empty() {
                continue;
            }

            let parts: Vec<&str> = line.split(',').collect();
            if parts.len() != 4 {
                return Err(LabelsError::InvalidLine {
                    line: line_number,
                    content: line,
                });
            }

            let channel = |field: &'static str, raw: &str| {
                raw.trim().parse::<u8>().map_err(|_| LabelsError::InvalidChannel {
                    field,
                    line: line_number,
                })
            };

            labels.push(ColorLabel {
                label: parts[0].trim().to_string(),
                red: channel("red", parts[1])?,
                green: channel("green", parts[2])?,
                blue: channel("blue", parts[3])?,
            });
        }

        Ok(Self { labels })
    }

    pub fn get(&self, class_id: usize) -> Option<&ColorLabel> {
        self.labels.get(class_id)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Falls back to a black `Unknown class N` entry for ids outside the table.
    pub fn resolve(&self, class_id: usize) -> ColorLabel {
        match self.get(class_id) {
            Some(label) => label.clone(),
            None => ColorLabel {
                label: format!("Unknown class {}", class_id),
                red: 0,
                green: 0,
                blue: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_labels() {
        let input = "person, 255, 0, 0\n\nbicycle,0,255,0\n";
        let labels = ClassLabels::parse(Cursor::new(input)).unwrap();

        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get(0).unwrap().label, "person");
        assert_eq!(labels.get(1).unwrap().green, 255);
    }

    #[test]
    fn test_parse_rejects_bad_channel() {
        let input = "person,300,0,0\n";
        let err = ClassLabels::parse(Cursor::new(input)).unwrap_err();
        assert!(matches!(
            err,
            LabelsError::InvalidChannel {
                field: "red",
                line: 1
            }
        ));
    }

    #[test]
    fn test_parse_rejects_bad_line() {
        let err = ClassLabels::parse(Cursor::new("person,1,2\n")).unwrap_err();
        assert!(matches!(err, LabelsError::InvalidLine { line: 1, .. }));
    }

    #[test]
    fn test_resolve_unknown_class() {
        let labels = ClassLabels::default();
        assert_eq!(labels.resolve(7).label, "Unknown class 7");
    }

    #[test]
    fn test_bundled_coco_labels() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("models/coco_labels.txt");
        let labels = ClassLabels::load(&path).unwrap();
        assert_eq!(labels.len(), 80);
        assert_eq!(labels.get(0).unwrap().label, "person");
    }
}
