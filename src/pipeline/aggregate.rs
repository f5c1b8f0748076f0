//! Page aggregator: one continuous, collision-free record table.
//!
//! Record numbers coming out of the merge engine are whatever the model
//! assigned per unit, typically `1..K` on every page. They are only
//! meaningful inside their unit, so the final table renumbers everything.

use crate::record::{Record, RecordId};

/// Concatenate per-unit records (unit order, then within-unit order) and
/// renumber them `1..=N`.
pub fn aggregate<I>(units: I) -> Vec<Record>
where
    I: IntoIterator<Item = Vec<Record>>,
{
    let mut records: Vec<Record> = units.into_iter().flatten().collect();
    for (i, record) in records.iter_mut().enumerate() {
        record.no = Some(RecordId::from(i + 1));
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(no: &str, name: &str) -> Record {
        Record {
            no: Some(RecordId::from(no)),
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn colliding_local_ids_become_dense() {
        let out = aggregate(vec![
            vec![rec("1", "SRI"), rec("2", "TONO")],
            vec![rec("1", "WATI")],
        ]);
        let ids: Vec<String> = out.iter().map(|r| r.no.as_ref().unwrap().to_string()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
        let names: Vec<&str> = out.iter().map(|r| r.name.as_deref().unwrap()).collect();
        assert_eq!(names, ["SRI", "TONO", "WATI"]);
    }

    #[test]
    fn records_without_id_get_one() {
        let out = aggregate(vec![vec![Record::default()]]);
        assert_eq!(out[0].no, Some(RecordId::Number(1)));
    }

    #[test]
    fn empty_units_are_skipped_over() {
        let out = aggregate(vec![vec![], vec![rec("9", "A")], vec![]]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].no, Some(RecordId::Number(1)));
    }
}
