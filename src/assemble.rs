//! Reassembly of rows from definition and repetition levels.

use crate::error::{ParquetError, Result};
use crate::page::DataPage;
use crate::schema::SchemaPath;
use crate::value::Value;

/// Builds top-level rows from consecutive data pages of one column.
///
/// Flat columns yield one value per level entry. Repeated columns yield a
/// [`Value::List`] per row, nested once per repeated ancestor; a row may
/// continue across a page boundary.
#[derive(Debug)]
pub struct RowAssembler {
    max_definition_level: u16,
    max_repetition_level: u16,
    /// Per repeated ancestor, outermost first: the level at which the list
    /// exists but is empty
    thresholds: Vec<u16>,
    /// Lists still open, outermost first
    open: Vec<Vec<Value>>,
    rows: Vec<Value>,
}

impl RowAssembler {
    pub fn new(path: &SchemaPath) -> Self {
        Self {
            max_definition_level: path.max_definition_level(),
            max_repetition_level: path.max_repetition_level(),
            thresholds: path.list_thresholds(),
            open: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Rows started so far; the last one may still be open
    pub fn row_count(&self) -> usize {
        self.rows.len() + usize::from(!self.open.is_empty())
    }

    pub fn push_page(&mut self, page: DataPage) -> Result<()> {
        let DataPage {
            num_values,
            repetition_levels,
            definition_levels,
            values,
            ..
        } = page;
        let mut values = values.into_iter();

        let Some(definition_levels) = definition_levels else {
            if values.len() < num_values {
                return Err(missing_values(num_values, values.len()));
            }
            self.rows.extend(values.take(num_values));
            return Ok(());
        };

        for index in 0..definition_levels.len() {
            let def = definition_levels[index];
            let rep = match &repetition_levels {
                Some(levels) => *levels.get(index).ok_or_else(|| {
                    ParquetError::format(format!(
                        "{} repetition levels for {} definition levels",
                        levels.len(),
                        definition_levels.len()
                    ))
                })?,
                None => 0,
            };
            let leaf = if def == self.max_definition_level {
                Some(values.next().ok_or_else(|| missing_values(index + 1, index))?)
            } else {
                None
            };
            self.push_entry(rep, def, leaf)?;
        }
        Ok(())
    }

    fn push_entry(&mut self, rep: u16, def: u16, leaf: Option<Value>) -> Result<()> {
        if self.max_repetition_level == 0 {
            self.rows.push(leaf.unwrap_or(Value::Null));
            return Ok(());
        }

        let depth = rep as usize;
        if depth > self.open.len() {
            return Err(ParquetError::format(format!(
                "repetition level {rep} continues a list that is not open"
            )));
        }
        self.close_to(depth);

        for level in depth..self.thresholds.len() {
            let threshold = self.thresholds[level];
            if def < threshold {
                self.emit(Value::Null);
                return Ok(());
            }
            if def == threshold {
                self.emit(Value::List(Vec::new()));
                return Ok(());
            }
            self.open.push(Vec::new());
        }
        self.emit(leaf.unwrap_or(Value::Null));
        Ok(())
    }

    fn close_to(&mut self, depth: usize) {
        while self.open.len() > depth {
            let Some(items) = self.open.pop() else {
                break;
            };
            self.emit(Value::List(items));
        }
    }

    fn emit(&mut self, value: Value) {
        match self.open.last_mut() {
            Some(parent) => parent.push(value),
            None => self.rows.push(value),
        }
    }

    /// Close any row still open and return every row.
    pub fn finish(mut self) -> Vec<Value> {
        self.close_to(0);
        self.rows
    }
}

fn missing_values(expected: usize, found: usize) -> ParquetError {
    ParquetError::format(format!(
        "page has {found} values where levels require at least {expected}"
    ))
}
