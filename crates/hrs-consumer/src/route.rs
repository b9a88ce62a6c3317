//! Event-type routing.
//!
//! The event-type wire value is `<aggregate>.<operation>`. Routing is a
//! fixed enumeration: parsing happens once per message and dispatch is a
//! static match, so an unknown type is poison (acknowledged and
//! tombstoned, never retried) rather than a lookup miss at apply time.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Department,
    Employee,
    Skill,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Created,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventKind {
    pub aggregate: Aggregate,
    pub op: Op,
}

impl EventKind {
    pub fn parse(event_type: &str) -> Option<Self> {
        let (aggregate, op) = event_type.split_once('.')?;

        let aggregate = match aggregate {
            "department" => Aggregate::Department,
            "employee" => Aggregate::Employee,
            "skill" => Aggregate::Skill,
            _ => return None,
        };

        let op = match op {
            "created" => Op::Created,
            "updated" => Op::Updated,
            "deleted" => Op::Deleted,
            _ => return None,
        };

        Some(Self { aggregate, op })
    }
}
