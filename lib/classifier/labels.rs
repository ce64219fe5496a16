use std::io;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub index: usize,
    pub name: String,
}

/// Parses `index,name` rows. A non-numeric first row is treated as a header.
pub fn parse_labels(raw: &str) -> Result<Vec<Label>, String> {
    let mut labels = Vec::new();
    for (line_no, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((index, name)) = line.split_once(',') else {
            return Err(format!("line {}: expected `index,name`", line_no + 1));
        };
        let index = match index.trim().parse::<usize>() {
            Ok(index) => index,
            Err(_) if line_no == 0 => continue,
            Err(_) => return Err(format!("line {}: invalid index {:?}", line_no + 1, index)),
        };
        labels.push(Label {
            index,
            name: name.trim().to_string(),
        });
    }
    labels.sort_by_key(|label| label.index);
    Ok(labels)
}

pub async fn load_labels(path: &Path) -> io::Result<Vec<Label>> {
    let raw = tokio::fs::read_to_string(path).await?;
    parse_labels(&raw).map_err(|msg| io::Error::new(io::ErrorKind::InvalidData, msg))
}
