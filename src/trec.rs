//! TREC-format records and ranking-file readers.
//!
//! Output records are the six-column form
//! `queryId Q0 externalDocid rank score runId` with 1-based ranks; an empty
//! result set emits a single placeholder line. Initial-ranking files use the
//! same shape, with query ids like `X.Y` denoting intent Y of query X.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::eval::ScoreList;
use crate::index::Index;
use crate::Error;

/// Default run id.
pub const DEFAULT_RUN_ID: &str = "?";

/// Write one query's ranking. Entries are emitted in their current order;
/// an empty list produces the `dummyRecord` placeholder.
pub fn write_ranking<W: Write>(
    out: &mut W,
    query_id: &str,
    results: &ScoreList,
    index: &Index,
    run_id: &str,
) -> Result<(), Error> {
    if results.is_empty() {
        writeln!(out, "{query_id} Q0 dummyRecord 1 0 {run_id}")?;
        return Ok(());
    }
    for (i, entry) in results.entries().iter().enumerate() {
        writeln!(
            out,
            "{} Q0 {} {} {} {}",
            query_id,
            index.external_docid(entry.docid)?,
            i + 1,
            entry.score,
            run_id
        )?;
    }
    Ok(())
}

/// Read a ranking file: query id -> `(externalDocid, score)` in rank order.
/// Intent rankings keep their dotted `X.Y` ids as map keys.
pub fn read_ranking_file(
    path: impl AsRef<Path>,
) -> Result<BTreeMap<String, Vec<(String, f64)>>, Error> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let mut by_query: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        let malformed = || Error::ParameterMalformed {
            key: path.display().to_string(),
            value: line.to_string(),
        };
        if fields.len() < 6 {
            return Err(malformed());
        }
        let score: f64 = fields[4].parse().map_err(|_| malformed())?;
        by_query
            .entry(fields[0].to_string())
            .or_default()
            .push((fields[2].to_string(), score));
    }
    Ok(by_query)
}

/// Read an intents file of `queryId.intentNumber:intentText` lines:
/// query id -> intents sorted by intent number.
pub fn read_intents_file(
    path: impl AsRef<Path>,
) -> Result<BTreeMap<String, Vec<(u32, String)>>, Error> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let mut by_query: BTreeMap<String, Vec<(u32, String)>> = BTreeMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = || Error::ParameterMalformed {
            key: path.display().to_string(),
            value: line.to_string(),
        };
        let (dotted, intent_text) = line.split_once(':').ok_or_else(malformed)?;
        let (query_id, intent) = dotted.split_once('.').ok_or_else(malformed)?;
        let intent: u32 = intent.trim().parse().map_err(|_| malformed())?;
        by_query
            .entry(query_id.trim().to_string())
            .or_default()
            .push((intent, intent_text.to_string()));
    }
    for intents in by_query.values_mut() {
        intents.sort_by_key(|&(n, _)| n);
    }
    Ok(by_query)
}

/// Split a dotted ranking-file query id into `(queryId, intentNumber)`.
pub fn split_intent_id(query_id: &str) -> Option<(&str, u32)> {
    let (base, intent) = query_id.split_once('.')?;
    intent.parse().ok().map(|n| (base, n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> Index {
        let mut b = Index::builder();
        b.add_document("GX000-00-0000000", &[("body", &["a"][..])]);
        b.add_document("GX000-00-0000001", &[("body", &["a"][..])]);
        b.build()
    }

    #[test]
    fn records_are_six_columns_with_one_based_ranks() {
        let ix = index();
        let mut results = ScoreList::new();
        results.add(1, 0.75);
        results.add(0, 0.5);
        let mut buf = Vec::new();
        write_ranking(&mut buf, "7", &results, &ix, DEFAULT_RUN_ID).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "7 Q0 GX000-00-0000001 1 0.75 ?\n7 Q0 GX000-00-0000000 2 0.5 ?\n"
        );
    }

    #[test]
    fn empty_results_emit_the_placeholder() {
        let ix = index();
        let mut buf = Vec::new();
        write_ranking(&mut buf, "7", &ScoreList::new(), &ix, DEFAULT_RUN_ID).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "7 Q0 dummyRecord 1 0 ?\n");
    }

    #[test]
    fn ranking_file_round_trips_with_intent_ids() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ranking.teIn");
        std::fs::write(
            &path,
            "12 Q0 GX000-00-0000000 1 4.5 run\n12.1 Q0 GX000-00-0000001 1 2.5 run\n",
        )
        .unwrap();
        let by_query = read_ranking_file(&path).unwrap();
        assert_eq!(by_query["12"], vec![("GX000-00-0000000".to_string(), 4.5)]);
        assert_eq!(split_intent_id("12.1"), Some(("12", 1)));
        assert_eq!(split_intent_id("12"), None);
    }

    #[test]
    fn intents_sort_by_intent_number() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("intents.txt");
        std::fs::write(&path, "9.2:second sense\n9.1:first sense\n").unwrap();
        let intents = read_intents_file(&path).unwrap();
        assert_eq!(
            intents["9"],
            vec![(1, "first sense".to_string()), (2, "second sense".to_string())]
        );
    }
}
