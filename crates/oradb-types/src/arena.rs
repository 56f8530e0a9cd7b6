//! Per-statement variable arena.
//!
//! A prepared statement keeps one [`BindArena`] across executions. Each
//! parameter position owns a [`Variable`] slot; a later execution reuses the
//! slot when the new value fits its metadata and only allocates a fresh
//! variable when it does not.

use crate::catalog::{Capabilities, DbType};
use crate::error::{Result, TypeError};
use crate::metadata::OracleMetadata;
use crate::value::BindValue;
use crate::variable::Variable;

#[derive(Debug, Clone)]
struct Slot {
    variable: Variable,
    declared: Option<OracleMetadata>,
}

/// Variables of one statement, indexed by bind position.
#[derive(Debug, Clone)]
pub struct BindArena {
    slots: Vec<Slot>,
    capabilities: Capabilities,
    is_plsql: bool,
    num_rows: u32,
}

impl BindArena {
    /// Create an empty arena.
    #[must_use]
    pub fn new(capabilities: Capabilities, is_plsql: bool) -> Self {
        Self {
            slots: Vec::new(),
            capabilities,
            is_plsql,
            num_rows: 0,
        }
    }

    /// Declare the type of a position instead of inferring it from values.
    ///
    /// Values bound to a declared position must be acceptable for that type.
    /// The declaration holds for every later execution, including ones that
    /// bind fewer positions; the slot is then left unset.
    pub fn declare(&mut self, position: usize, metadata: OracleMetadata) {
        let variable = Variable::new(metadata.clone(), self.capabilities, self.is_plsql);
        let slot = Slot {
            variable,
            declared: Some(metadata),
        };
        if position < self.slots.len() {
            self.slots[position] = slot;
        } else {
            while self.slots.len() < position {
                self.slots.push(Slot {
                    variable: placeholder(self.capabilities, self.is_plsql),
                    declared: None,
                });
            }
            self.slots.push(slot);
        }
    }

    /// Bind the values of a single execution, one per position.
    pub fn bind_row(&mut self, values: Vec<BindValue>) -> Result<()> {
        self.retain_width(values.len());
        for (position, value) in values.into_iter().enumerate() {
            if position == self.slots.len() {
                let variable = Variable::from_value(&value, self.is_plsql, self.capabilities)?;
                self.slots.push(Slot {
                    variable,
                    declared: None,
                });
                continue;
            }

            let slot = &mut self.slots[position];
            if let Some(metadata) = &slot.declared {
                if slot.variable.num_elements() != metadata.num_elements {
                    slot.variable = Variable::new(metadata.clone(), self.capabilities, self.is_plsql);
                }
                slot.variable.set(value)?;
            } else if !reuse_for_value(&mut slot.variable, &value)? {
                slot.variable = Variable::from_value(&value, self.is_plsql, self.capabilities)?;
            }
        }
        self.num_rows = 1;
        Ok(())
    }

    /// Bind the rows of a batch execution.
    ///
    /// Every row must supply the same number of values. Each position gets
    /// one variable with a slot per row, its metadata widened across rows.
    pub fn bind_rows(&mut self, rows: &[Vec<BindValue>]) -> Result<()> {
        let width = rows.first().map_or(0, Vec::len);
        if let Some((row, values)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(TypeError::RowLength {
                row,
                expected: width,
                actual: values.len(),
            });
        }

        let num_rows = u32::try_from(rows.len()).map_err(|_| TypeError::Capacity {
            num_elements: u32::MAX,
            requested: rows.len(),
        })?;

        self.retain_width(width);
        for position in 0..width {
            let column: Vec<BindValue> = rows.iter().map(|row| row[position].clone()).collect();

            if position == self.slots.len() {
                let variable = Variable::from_values(&column, self.is_plsql, self.capabilities)?;
                self.slots.push(Slot {
                    variable,
                    declared: None,
                });
                continue;
            }

            let slot = &mut self.slots[position];
            if let Some(metadata) = &slot.declared {
                if slot.variable.num_elements() != num_rows {
                    slot.variable =
                        Variable::new(metadata.clone().rows(num_rows), self.capabilities, self.is_plsql);
                }
                for (row, value) in (0..num_rows).zip(column) {
                    slot.variable.bind_scalar(row, value)?;
                }
            } else if !reuse_for_column(&mut slot.variable, &column, num_rows)? {
                slot.variable = Variable::from_values(&column, self.is_plsql, self.capabilities)?;
            }
        }
        self.num_rows = num_rows;
        Ok(())
    }

    /// Drop inferred slots past `width`. Declared positions past it are kept
    /// but unset.
    fn retain_width(&mut self, width: usize) {
        let keep = self
            .slots
            .iter()
            .rposition(|slot| slot.declared.is_some())
            .map_or(width, |last| width.max(last + 1));
        self.slots.truncate(keep);
        for slot in self.slots.iter_mut().skip(width) {
            slot.variable.reset();
        }
    }

    /// Variable bound at `position`.
    #[must_use]
    pub fn variable(&self, position: usize) -> Option<&Variable> {
        self.slots.get(position).map(|slot| &slot.variable)
    }

    /// Mutable access to the variable at `position`, e.g. to set converters.
    pub fn variable_mut(&mut self, position: usize) -> Option<&mut Variable> {
        self.slots.get_mut(position).map(|slot| &mut slot.variable)
    }

    /// All variables in position order.
    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.slots.iter().map(|slot| &slot.variable)
    }

    /// Number of bind positions, declared ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no position has been bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Rows bound by the last `bind_row`/`bind_rows` call.
    #[must_use]
    pub fn num_rows(&self) -> u32 {
        self.num_rows
    }

    /// Whether the statement is PL/SQL.
    #[must_use]
    pub fn is_plsql(&self) -> bool {
        self.is_plsql
    }

    /// Capability set variables are created with.
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Update the capability set, e.g. after the statement moves to another
    /// connection. Existing slots are rebuilt on their next bind.
    pub fn set_capabilities(&mut self, capabilities: Capabilities) {
        if self.capabilities != capabilities {
            self.capabilities = capabilities;
            for slot in &mut self.slots {
                slot.variable = match &slot.declared {
                    Some(metadata) => Variable::new(metadata.clone(), capabilities, self.is_plsql),
                    None => placeholder(capabilities, self.is_plsql),
                };
            }
        }
    }

    /// Mark every slot unset while keeping its allocation for the next execution.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.variable.reset();
        }
        self.num_rows = 0;
    }
}

/// Untyped slot that the next bind replaces or widens.
fn placeholder(capabilities: Capabilities, is_plsql: bool) -> Variable {
    Variable::for_rows(OracleMetadata::with_size(DbType::Varchar, 1), 1, capabilities, is_plsql)
}

/// Try to bind a single-execution value into an existing inferred variable.
fn reuse_for_value(variable: &mut Variable, value: &BindValue) -> Result<bool> {
    match value {
        BindValue::Array(values) if variable.is_array() => {
            if values.len() > variable.num_elements() as usize {
                return Ok(false);
            }
            variable.probe_array(values.clone())
        }
        BindValue::Array(_) => Ok(false),
        _ if variable.is_array() || variable.num_elements() != 1 => Ok(false),
        _ => variable.probe_scalar(0, value.clone()),
    }
}

/// Try to bind a batch column into an existing inferred variable.
fn reuse_for_column(variable: &mut Variable, column: &[BindValue], num_rows: u32) -> Result<bool> {
    if variable.is_array() || variable.num_elements() != num_rows {
        return Ok(false);
    }
    let mut candidate = variable.clone();
    for (row, value) in (0..num_rows).zip(column) {
        if !candidate.probe_scalar(row, value.clone())? {
            return Ok(false);
        }
    }
    *variable = candidate;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> BindArena {
        BindArena::new(Capabilities::default(), false)
    }

    #[test]
    fn test_bind_row_infers_each_position() {
        let mut arena = arena();
        arena
            .bind_row(vec![BindValue::from(1), BindValue::from("x"), BindValue::Null])
            .unwrap();
        assert_eq!(arena.len(), 3);
        assert_eq!(arena.num_rows(), 1);
        assert_eq!(arena.variable(0).unwrap().dbtype(), DbType::Number);
        assert_eq!(arena.variable(1).unwrap().dbtype(), DbType::Varchar);
        assert_eq!(arena.variable(2).unwrap().metadata().max_size, 1);
    }

    #[test]
    fn test_bind_row_reuses_compatible_slot() {
        let mut arena = arena();
        arena.bind_row(vec![BindValue::from("short")]).unwrap();
        arena.bind_row(vec![BindValue::from("a much longer value")]).unwrap();

        let var = arena.variable(0).unwrap();
        assert_eq!(var.dbtype(), DbType::Varchar);
        assert_eq!(var.metadata().max_size, 19);
    }

    #[test]
    fn test_bind_row_replaces_incompatible_slot() {
        let mut arena = arena();
        arena.bind_row(vec![BindValue::from("text")]).unwrap();
        arena.bind_row(vec![BindValue::from(5)]).unwrap();
        assert_eq!(arena.variable(0).unwrap().dbtype(), DbType::Number);
    }

    #[test]
    fn test_declared_position_is_strict() {
        let mut arena = arena();
        arena.declare(0, OracleMetadata::new(DbType::Number));
        let err = arena.bind_row(vec![BindValue::from("x")]).unwrap_err();
        assert!(matches!(err, TypeError::ArgumentType { .. }));
    }

    #[test]
    fn test_bind_rows_widens_across_rows() {
        let mut arena = arena();
        let rows = vec![
            vec![BindValue::from(1), BindValue::from("a")],
            vec![BindValue::from(2), BindValue::from("abc")],
            vec![BindValue::from(3), BindValue::Null],
        ];
        arena.bind_rows(&rows).unwrap();

        assert_eq!(arena.num_rows(), 3);
        let names = arena.variable(1).unwrap();
        assert_eq!(names.num_elements(), 3);
        assert_eq!(names.metadata().max_size, 3);
        assert_eq!(names.get_value(1).unwrap(), BindValue::from("abc"));
    }

    #[test]
    fn test_declared_batch_drops_rows_of_larger_batch() {
        let mut arena = arena();
        arena.declare(0, OracleMetadata::new(DbType::Number));

        let first: Vec<Vec<BindValue>> = (1..=3).map(|n| vec![BindValue::from(n)]).collect();
        arena.bind_rows(&first).unwrap();
        assert_eq!(arena.variable(0).unwrap().values().len(), 3);

        let second = vec![vec![BindValue::from(7)], vec![BindValue::from(8)]];
        arena.bind_rows(&second).unwrap();
        assert_eq!(arena.num_rows(), 2);
        let var = arena.variable(0).unwrap();
        assert_eq!(var.dbtype(), DbType::Number);
        assert_eq!(var.values(), &[BindValue::from(7), BindValue::from(8)]);
    }

    #[test]
    fn test_declared_position_survives_narrower_row() {
        let mut arena = arena();
        arena.declare(2, OracleMetadata::new(DbType::Number));

        arena.bind_row(vec![BindValue::from("a")]).unwrap();
        assert_eq!(arena.len(), 3);
        let declared = arena.variable(2).unwrap();
        assert_eq!(declared.dbtype(), DbType::Number);
        assert!(!declared.is_set());

        let err = arena
            .bind_row(vec![BindValue::from("a"), BindValue::from("b"), BindValue::from("x")])
            .unwrap_err();
        assert!(matches!(err, TypeError::ArgumentType { .. }));

        arena
            .bind_row(vec![BindValue::from("a"), BindValue::from("b"), BindValue::from(5)])
            .unwrap();
        assert_eq!(arena.variable(2).unwrap().get_value(0).unwrap(), BindValue::from(5));
    }

    #[test]
    fn test_bind_rows_rejects_ragged_rows() {
        let mut arena = arena();
        let rows = vec![vec![BindValue::from(1)], vec![]];
        assert_eq!(
            arena.bind_rows(&rows).unwrap_err(),
            TypeError::RowLength {
                row: 1,
                expected: 1,
                actual: 0
            }
        );
    }

    #[test]
    fn test_bind_rows_mixed_column_types() {
        let mut arena = arena();
        let rows = vec![vec![BindValue::from(1)], vec![BindValue::from("one")]];
        assert!(matches!(
            arena.bind_rows(&rows),
            Err(TypeError::TypeConflict { .. })
        ));
    }

    #[test]
    fn test_reset_keeps_slots() {
        let mut arena = arena();
        arena.bind_row(vec![BindValue::from(1)]).unwrap();
        arena.reset();
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.num_rows(), 0);
        assert!(!arena.variable(0).unwrap().is_set());
    }
}
