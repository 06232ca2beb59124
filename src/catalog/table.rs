use std::{
    fs,
    path::{Path, PathBuf},
};

use regex::Regex;

use super::{CatalogError, Result};

/// Plain text source catalog
///
/// Reads whitespace separated tables with either SExtractor headers
/// (`#   1 NUMBER   Running object number`), a commented column line
/// (`# ID RA DEC`) or a bare first line of column names, and comma separated
/// tables with a header row.
#[derive(Debug, Clone, Default)]
pub struct SourceTable {
    pub path: PathBuf,
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}
impl SourceTable {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents =
            fs::read_to_string(path).map_err(|e| CatalogError::ReadFile(e, path.to_path_buf()))?;
        let is_csv = path.extension().is_some_and(|ext| ext == "csv")
            || contents
                .lines()
                .find(|line| !line.trim().is_empty() && !line.starts_with('#'))
                .is_some_and(|line| line.contains(','));
        let mut table = if is_csv {
            Self::from_csv(&contents)?
        } else {
            Self::from_ascii(&contents, path)?
        };
        table.path = path.to_path_buf();
        Ok(table)
    }
    fn from_csv(contents: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(contents.as_bytes());
        let columns = rdr.headers()?.iter().map(String::from).collect();
        let rows = rdr
            .records()
            .map(|record| record.map(|r| r.iter().map(String::from).collect()))
            .collect::<std::result::Result<Vec<Vec<String>>, csv::Error>>()?;
        Ok(Self {
            columns,
            rows,
            ..Default::default()
        })
    }
    fn from_ascii(contents: &str, path: &Path) -> Result<Self> {
        let re_sex = Regex::new(r"^#\s+(\d+)\s+(\S+)")?;
        let mut sextractor: Vec<(usize, String)> = vec![];
        let mut last_comment: Option<Vec<String>> = None;
        let mut header: Option<Vec<String>> = None;
        let mut rows: Vec<Vec<String>> = vec![];
        for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if line.starts_with('#') {
                if let Some(capts) = re_sex.captures(line) {
                    if let Ok(index) = capts[1].parse::<usize>() {
                        sextractor.push((index, capts[2].to_string()));
                    }
                } else if rows.is_empty() && header.is_none() {
                    last_comment = Some(
                        line.trim_start_matches('#')
                            .split_whitespace()
                            .map(String::from)
                            .collect(),
                    );
                }
                continue;
            }
            let values: Vec<String> = line.split_whitespace().map(String::from).collect();
            if sextractor.is_empty() && header.is_none() {
                match last_comment.take() {
                    Some(names) if names.len() == values.len() => header = Some(names),
                    _ => {
                        header = Some(values);
                        continue;
                    }
                }
            }
            rows.push(values);
        }
        let columns = if sextractor.is_empty() {
            header.ok_or_else(|| CatalogError::NoHeader(path.to_path_buf()))?
        } else {
            let width = rows.first().map_or(0, Vec::len);
            sextractor_columns(sextractor, width)
        };
        for (k, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(CatalogError::RowLength {
                    path: path.to_path_buf(),
                    row: k + 1,
                    found: row.len(),
                    expected: columns.len(),
                });
            }
        }
        Ok(Self {
            columns,
            rows,
            ..Default::default()
        })
    }
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
    /// Values of the column `name`
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let k = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[k].as_str()).collect())
    }
    /// Object ids, in table order
    ///
    /// Looks for an `ID` column, then an `id` column whose values end with
    /// `_<number>`, then a `NUMBER` column.
    pub fn ids(&self) -> Result<Vec<u64>> {
        if let Some(values) = self.column("ID") {
            values.into_iter().map(parse_id).collect()
        } else if let Some(values) = self.column("id") {
            values
                .into_iter()
                .map(|value| parse_id(value.rsplit('_').next().unwrap_or(value)))
                .collect()
        } else if let Some(values) = self.column("NUMBER") {
            values.into_iter().map(parse_id).collect()
        } else {
            Err(CatalogError::MissingIdColumn {
                columns: self.columns.clone(),
            })
        }
    }
}

/// Expands SExtractor column indices into names, vector columns get a `_<k>` suffix
///
/// Columns before the first named one are `col<k>`.
fn sextractor_columns(mut header: Vec<(usize, String)>, width: usize) -> Vec<String> {
    header.sort_by_key(|(index, _)| *index);
    let width = width.max(header.last().map_or(0, |(index, _)| *index));
    let mut columns = Vec::with_capacity(width);
    let mut named = header.into_iter().peekable();
    let mut current: Option<(usize, String)> = None;
    for position in 1..=width {
        if let Some((index, name)) = named.next_if(|(index, _)| *index == position) {
            current = Some((index, name.clone()));
            columns.push(name);
        } else {
            columns.push(match &current {
                Some((index, name)) => format!("{name}_{}", position - index),
                None => format!("col{position}"),
            });
        }
    }
    columns
}

fn parse_id(value: &str) -> Result<u64> {
    let value = value.trim();
    value
        .parse::<u64>()
        .ok()
        .or_else(|| {
            value
                .parse::<f64>()
                .ok()
                .filter(|x| *x >= 0. && x.fract() == 0.)
                .map(|x| x as u64)
        })
        .ok_or_else(|| CatalogError::BadId(value.to_string()))
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use super::*;

    fn write(name: &str, contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn uppercase_id_column() -> std::result::Result<(), Box<dyn Error>> {
        let (_dir, path) = write(
            "UVJ_quiescent_goodss.dat",
            "# ID ra dec z\n 101 53.1 -27.8 1.2\n 2045 53.2 -27.7 0.9\n",
        );
        let table = SourceTable::from_path(path)?;
        assert_eq!(table.columns(), ["ID", "ra", "dec", "z"]);
        assert_eq!(table.ids()?, vec![101, 2045]);
        Ok(())
    }

    #[test]
    fn suffixed_lowercase_id_column() -> std::result::Result<(), Box<dyn Error>> {
        let (_dir, path) = write(
            "added_sources_N_key_z3.dat",
            "id ra dec\nGN2_00312 189.2 62.2\nGN3_12001 189.3 62.3\n",
        );
        let table = SourceTable::from_path(path)?;
        assert_eq!(table.ids()?, vec![312, 12001]);
        Ok(())
    }

    #[test]
    fn sextractor_number_column() -> std::result::Result<(), Box<dyn Error>> {
        let (_dir, path) = write(
            "GoodsS_plus.cat",
            "#   1 NUMBER     Running object number\n\
             #   2 FLUX_APER  Flux vector within fixed circular aperture(s)\n\
             #   5 MAG_AUTO   Kron-like elliptical aperture magnitude\n\
             1 0.1 0.2 0.3 23.4\n\
             2 0.4 0.5 0.6 25.1\n",
        );
        let table = SourceTable::from_path(path)?;
        assert_eq!(
            table.columns(),
            ["NUMBER", "FLUX_APER", "FLUX_APER_1", "FLUX_APER_2", "MAG_AUTO"]
        );
        assert_eq!(table.column("MAG_AUTO"), Some(vec!["23.4", "25.1"]));
        assert_eq!(table.ids()?, vec![1, 2]);
        Ok(())
    }

    #[test]
    fn unnamed_leading_columns() -> std::result::Result<(), Box<dyn Error>> {
        let (_dir, path) = write(
            "GoodsN_plus.cat",
            "#   3 NUMBER     Running object number\n\
             #   4 MAG_AUTO   Kron-like elliptical aperture magnitude\n\
             189.1 62.1 7 24.2\n",
        );
        let table = SourceTable::from_path(path)?;
        assert_eq!(table.columns(), ["col1", "col2", "NUMBER", "MAG_AUTO"]);
        assert_eq!(table.ids()?, vec![7]);
        Ok(())
    }

    #[test]
    fn csv_table() -> std::result::Result<(), Box<dyn Error>> {
        let (_dir, path) = write("Ivas_goodsn.csv", "ID, ra, dec\n17.0, 189.1, 62.1\n");
        assert_eq!(SourceTable::from_path(path)?.ids()?, vec![17]);
        Ok(())
    }

    #[test]
    fn missing_id_column() {
        let (_dir, path) = write("bad.dat", "ra dec\n189.1 62.1\n");
        let table = SourceTable::from_path(path).unwrap();
        assert!(matches!(
            table.ids(),
            Err(CatalogError::MissingIdColumn { .. })
        ));
    }

    #[test]
    fn ragged_rows() {
        let (_dir, path) = write("ragged.dat", "ID ra dec\n1 2 3\n4 5\n");
        assert!(matches!(
            SourceTable::from_path(path),
            Err(CatalogError::RowLength { row: 2, .. })
        ));
    }
}
