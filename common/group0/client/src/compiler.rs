// Copyright 2021 Datafuse Labs.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Translates the narrow statement subset allowed against
//! `system.group0_kv_store` into k/v query payloads. Parsing itself happens
//! upstream; this is the boundary that decides what of the parsed surface is
//! expressible as a group-0 query.

use common_exception::ErrorCode;
use common_exception::Result;
use common_group0_types::KvQuery;
use common_group0_types::GROUP0_KV_STORE_TABLE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelOp {
    Eq,
    Ne,
    Lt,
    Gt,
    In,
}

/// One `column <op> value` term of a WHERE or IF clause, with values already
/// rendered as UTF-8 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restriction {
    pub column: String,
    pub op: RelOp,
    pub value: String,
}

impl Restriction {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Restriction {
        Restriction {
            column: column.into(),
            op: RelOp::Eq,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectStatement {
    /// `keyspace.table` the statement addresses.
    pub table: String,
    pub columns: Vec<String>,
    pub restrictions: Vec<Restriction>,
}

#[derive(Debug, Clone)]
pub struct UpdateStatement {
    pub table: String,
    /// `SET column = value` pairs.
    pub assignments: Vec<(String, String)>,
    pub restrictions: Vec<Restriction>,
    /// `IF column = value` terms.
    pub if_conditions: Vec<Restriction>,
}

fn unsupported(what: impl Into<String>) -> ErrorCode {
    ErrorCode::UnsupportedOperation(format!(
        "unsupported operation on {}: {}",
        GROUP0_KV_STORE_TABLE,
        what.into()
    ))
}

fn check_table(table: &str) -> Result<()> {
    if table != GROUP0_KV_STORE_TABLE {
        return Err(unsupported(format!("statement targets {}", table)));
    }
    Ok(())
}

/// The key must appear in exactly one equality restriction; anything else
/// would address more than the single row of a partition, or scan.
fn key_restriction(restrictions: &[Restriction]) -> Result<Vec<u8>> {
    if restrictions.is_empty() {
        return Err(unsupported("full-table scans are not allowed"));
    }
    if restrictions.len() > 1 {
        return Err(unsupported(
            "only a single restriction on the partition key is allowed",
        ));
    }

    let r = &restrictions[0];
    if r.column != "key" {
        return Err(unsupported(format!("restriction on column {}", r.column)));
    }
    if r.op != RelOp::Eq {
        return Err(unsupported(
            "the partition key must be restricted by equality",
        ));
    }

    Ok(r.value.as_bytes().to_vec())
}

pub fn compile_select(stmt: &SelectStatement) -> Result<KvQuery> {
    check_table(&stmt.table)?;

    if stmt.columns != ["value"] {
        return Err(unsupported(format!(
            "select must read only the value column, not {:?}",
            stmt.columns
        )));
    }

    let key = key_restriction(&stmt.restrictions)?;

    Ok(KvQuery::Select { key })
}

pub fn compile_update(stmt: &UpdateStatement) -> Result<KvQuery> {
    check_table(&stmt.table)?;

    if stmt.assignments.len() != 1 {
        return Err(unsupported(
            "update must assign exactly one column",
        ));
    }
    let (col, val) = &stmt.assignments[0];
    if col != "value" {
        return Err(unsupported(format!("assignment to column {}", col)));
    }

    let key = key_restriction(&stmt.restrictions)?;

    let value_condition = match stmt.if_conditions.len() {
        0 => None,
        1 => {
            let c = &stmt.if_conditions[0];
            if c.column != "value" || c.op != RelOp::Eq {
                return Err(unsupported(
                    "only a single `IF value = ...` condition is allowed",
                ));
            }
            Some(c.value.as_bytes().to_vec())
        }
        _ => {
            return Err(unsupported(
                "only a single `IF value = ...` condition is allowed",
            ));
        }
    };

    Ok(KvQuery::Update {
        key,
        new_value: val.as_bytes().to_vec(),
        value_condition,
    })
}
