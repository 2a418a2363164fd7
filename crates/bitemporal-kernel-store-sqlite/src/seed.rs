//! Demo history restored by `Reset`.
//!
//! Everything was first recorded on 2024-01-01. Employee 101 carries one
//! retroactive correction recorded on 2024-09-01 so that a fresh database already
//! shows a superseded version.

use bitemporal_kernel_core::{Instant, Interval};
use serde_json::{json, Map, Value};
use time::macros::datetime;

use crate::tables::HistoryTable;

pub(crate) struct SeedVersion {
    pub table: HistoryTable,
    pub entity_id: i64,
    pub attributes: Map<String, Value>,
    pub valid: Interval,
    pub transaction: Interval,
}

const RECORDED: Instant = datetime!(2024-01-01 0:00);
const CORRECTED: Instant = datetime!(2024-09-01 0:00);

fn attributes(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(column, value)| ((*column).to_string(), value.clone())).collect()
}

fn department(dept_id: i64, name: &str, location: &str, valid_from: Instant) -> SeedVersion {
    SeedVersion {
        table: HistoryTable::Department,
        entity_id: dept_id,
        attributes: attributes(&[("dept_name", json!(name)), ("location", json!(location))]),
        valid: Interval::open(valid_from),
        transaction: Interval::open(RECORDED),
    }
}

struct Person<'a> {
    emp_id: i64,
    dept_id: i64,
    first_name: &'a str,
    last_name: &'a str,
    hire_date: &'a str,
}

fn employee(person: &Person<'_>, job_title: &str, valid: Interval, transaction: Interval) -> SeedVersion {
    SeedVersion {
        table: HistoryTable::Employee,
        entity_id: person.emp_id,
        attributes: attributes(&[
            ("dept_id", json!(person.dept_id)),
            ("first_name", json!(person.first_name)),
            ("last_name", json!(person.last_name)),
            ("job_title", json!(job_title)),
            ("hire_date", json!(person.hire_date)),
            ("term_date", Value::Null),
        ]),
        valid,
        transaction,
    }
}

/// Seed versions in insertion order, which fixes their history ids.
pub(crate) fn demo_history() -> Vec<SeedVersion> {
    let jane = Person {
        emp_id: 100,
        dept_id: 10,
        first_name: "Jane",
        last_name: "Doe",
        hire_date: "2020-06-15",
    };
    let john = Person {
        emp_id: 101,
        dept_id: 10,
        first_name: "John",
        last_name: "Smith",
        hire_date: "2021-02-01",
    };
    let alice = Person {
        emp_id: 102,
        dept_id: 20,
        first_name: "Alice",
        last_name: "Wong",
        hire_date: "2022-04-01",
    };

    vec![
        department(10, "Sales", "New York", datetime!(2020-06-01 0:00)),
        department(20, "Marketing", "Chicago", datetime!(2021-03-01 0:00)),
        employee(
            &jane,
            "Sales Rep",
            Interval::open(datetime!(2020-06-15 0:00)),
            Interval::open(RECORDED),
        ),
        employee(
            &john,
            "Account Executive",
            Interval::open(datetime!(2021-02-01 0:00)),
            Interval::closed(RECORDED, CORRECTED),
        ),
        employee(
            &john,
            "Account Executive",
            Interval::closed(datetime!(2021-02-01 0:00), datetime!(2024-07-01 0:00)),
            Interval::open(CORRECTED),
        ),
        employee(
            &john,
            "Senior Account Executive",
            Interval::open(datetime!(2024-07-01 0:00)),
            Interval::open(CORRECTED),
        ),
        employee(
            &alice,
            "Marketing Analyst",
            Interval::open(datetime!(2022-04-01 0:00)),
            Interval::open(RECORDED),
        ),
    ]
}
