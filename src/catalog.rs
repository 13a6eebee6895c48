//! Catalog dump parsing: bulk RDF export → normalized metadata triples.
//!
//! The corpus's bulk export is a tar archive (optionally gzip-compressed)
//! containing one small RDF/XML record per work, named `pg<N>.rdf`. This
//! module walks the archive sequentially, parses each record with oxigraph,
//! and flattens the interesting predicate paths into [`Triple`]s:
//!
//! - `title`, `rights` — direct literal properties of the ebook node
//! - `formaturi` — direct IRI property (`dcterms:hasFormat`)
//! - `author` — two-hop path `dcterms:creator` → `pgterms:alias`
//! - `language`, `subject` — two-hop path through `rdf:value`
//!
//! Malformed records are skipped and counted, never fatal: a multi-hour
//! ingestion must not abort because one record in tens of thousands is bad.
//! The stream is single-pass and restartable only from the source.

use std::io::Read;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use flate2::read::GzDecoder;
use oxigraph::io::{RdfFormat, RdfParser};
use oxigraph::model::{Quad, Subject, Term};
use regex::Regex;
use tar::Archive;

use crate::error::CatalogError;
use crate::model::{EtextId, Triple};
use crate::vocabulary::{DCTERMS, EBOOK_NS, PGTERMS, Predicate, RDF_NS};

/// Base IRI for resolving the relative `rdf:about` references in records.
const CATALOG_BASE_IRI: &str = "http://www.gutenberg.org/";

/// Counters reported by a parse run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Records successfully parsed.
    pub records: u64,
    /// Triples emitted to the sink.
    pub triples: u64,
    /// Records skipped (unparseable RDF, missing or non-numeric entity id).
    pub skipped_records: u64,
    /// Individual facts dropped from otherwise good records (e.g. IRIs
    /// containing spaces).
    pub skipped_facts: u64,
}

fn record_name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"pg\d+\.rdf$").expect("valid regex"))
}

/// A catalog dump on disk, restartable from the beginning.
///
/// Restart means re-reading the source file; there is no mid-stream
/// checkpoint to resume from.
#[derive(Debug, Clone)]
pub struct CatalogDump {
    path: PathBuf,
    gzipped: bool,
}

impl CatalogDump {
    /// Wrap a dump file. Compression is sniffed from the extension
    /// (`.gz` / `.tgz` → gzip, anything else → plain tar).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let gzipped = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("gz") | Some("tgz")
        );
        Self { path, gzipped }
    }

    /// The dump file's location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stream the dump's normalized triples into `sink` in a single pass.
    ///
    /// The sink may return `ControlFlow::Break(())` to stop the stream early
    /// (cooperative cancellation); the stats cover everything seen up to that
    /// point.
    pub fn stream(
        &self,
        sink: impl FnMut(Triple) -> ControlFlow<()>,
    ) -> Result<ParseStats, CatalogError> {
        let file = std::fs::File::open(&self.path)
            .map_err(|e| CatalogError::Io { source: e })?;
        if self.gzipped {
            stream_records(GzDecoder::new(file), sink)
        } else {
            stream_records(file, sink)
        }
    }
}

/// Stream normalized triples from an uncompressed tar stream of RDF records.
///
/// This is the parser's whole contract with the catalog source: the reader
/// only needs to be readable sequentially to exhaustion.
pub fn stream_records<R: Read>(
    reader: R,
    mut sink: impl FnMut(Triple) -> ControlFlow<()>,
) -> Result<ParseStats, CatalogError> {
    let mut archive = Archive::new(reader);
    let mut stats = ParseStats::default();

    let entries = archive.entries().map_err(|e| CatalogError::Archive {
        message: format!("cannot enumerate archive entries: {e}"),
    })?;

    for entry in entries {
        let mut entry = entry.map_err(|e| CatalogError::Archive {
            message: format!("corrupt archive entry: {e}"),
        })?;

        let is_record = entry
            .path()
            .ok()
            .and_then(|p| p.to_str().map(|s| record_name_regex().is_match(s)))
            .unwrap_or(false);
        if !is_record {
            continue;
        }

        let mut raw = Vec::new();
        if entry.read_to_end(&mut raw).is_err() {
            stats.skipped_records += 1;
            continue;
        }

        match parse_record(&raw) {
            Some(record) => {
                stats.records += 1;
                stats.skipped_facts += record.skipped_facts;
                for triple in record.triples {
                    stats.triples += 1;
                    if sink(triple).is_break() {
                        return Ok(stats);
                    }
                }
            }
            None => {
                tracing::debug!(skipped = stats.skipped_records + 1, "skipping malformed record");
                stats.skipped_records += 1;
            }
        }
    }

    Ok(stats)
}

struct ParsedRecord {
    triples: Vec<Triple>,
    skipped_facts: u64,
}

/// Parse one RDF/XML record and flatten it into normalized triples.
///
/// Returns `None` when the record is malformed as a whole: unparseable RDF,
/// or no ebook node with a numeric id.
fn parse_record(raw: &[u8]) -> Option<ParsedRecord> {
    let parser = RdfParser::from_format(RdfFormat::RdfXml)
        .with_base_iri(CATALOG_BASE_IRI)
        .ok()?;

    let mut quads = Vec::new();
    let mut skipped_facts = 0u64;
    for quad in parser.for_reader(raw) {
        match quad {
            Ok(quad) => {
                if fact_is_invalid(&quad) {
                    skipped_facts += 1;
                } else {
                    quads.push(quad);
                }
            }
            Err(_) => return None,
        }
    }

    let (ebook_key, etext) = find_ebook_node(&quads)?;
    let mut triples = Vec::new();

    let dc = |name: &str| format!("{DCTERMS}{name}");
    let pg_alias = format!("{PGTERMS}alias");
    let rdf_value = format!("{RDF_NS}value");

    for quad in quads.iter().filter(|q| subject_key(&q.subject) == ebook_key) {
        let pred = quad.predicate.as_str();
        if pred == dc("title") {
            if let Term::Literal(lit) = &quad.object {
                triples.push(Triple::new(etext, Predicate::Title, lit.value()));
            }
        } else if pred == dc("rights") {
            if let Term::Literal(lit) = &quad.object {
                triples.push(Triple::new(etext, Predicate::Rights, lit.value()));
            }
        } else if pred == dc("hasFormat") {
            if let Term::NamedNode(node) = &quad.object {
                triples.push(Triple::new(etext, Predicate::FormatUri, node.as_str()));
            }
        } else if pred == dc("creator") {
            for value in hop_values(&quads, &quad.object, &pg_alias) {
                triples.push(Triple::new(etext, Predicate::Author, value));
            }
        } else if pred == dc("language") {
            for value in hop_values(&quads, &quad.object, &rdf_value) {
                triples.push(Triple::new(etext, Predicate::Language, value));
            }
        } else if pred == dc("subject") {
            for value in hop_values(&quads, &quad.object, &rdf_value) {
                triples.push(Triple::new(etext, Predicate::Subject, value));
            }
        }
    }

    Some(ParsedRecord {
        triples,
        skipped_facts,
    })
}

/// A fact is not well formed if any of its IRIs contains a space.
fn fact_is_invalid(quad: &Quad) -> bool {
    let subject_bad = match &quad.subject {
        Subject::NamedNode(n) => n.as_str().contains(' '),
        _ => false,
    };
    let object_bad = match &quad.object {
        Term::NamedNode(n) => n.as_str().contains(' '),
        _ => false,
    };
    subject_bad || object_bad || quad.predicate.as_str().contains(' ')
}

/// Locate the ebook node and parse its numeric id from the entity IRI.
fn find_ebook_node(quads: &[Quad]) -> Option<(String, EtextId)> {
    for quad in quads {
        if let Subject::NamedNode(node) = &quad.subject {
            if let Some(tail) = node.as_str().strip_prefix(EBOOK_NS) {
                if let Some(id) = tail.parse::<u64>().ok().and_then(EtextId::new) {
                    return Some((subject_key(&quad.subject), id));
                }
            }
        }
    }
    None
}

/// Join key for a subject or object node (IRI or blank node label).
fn subject_key(subject: &Subject) -> String {
    subject.to_string()
}

fn object_key(term: &Term) -> Option<String> {
    match term {
        Term::NamedNode(_) | Term::BlankNode(_) => Some(term.to_string()),
        _ => None,
    }
}

/// Follow a two-hop path: from `via` (an intermediate node) collect the
/// literal values of its `pred` property.
fn hop_values(quads: &[Quad], via: &Term, pred: &str) -> Vec<String> {
    let Some(key) = object_key(via) else {
        return Vec::new();
    };
    quads
        .iter()
        .filter(|q| subject_key(&q.subject) == key && q.predicate.as_str() == pred)
        .filter_map(|q| match &q.object {
            Term::Literal(lit) => Some(lit.value().to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod testutil {
    //! RDF/XML and tar fixtures shared by the parser, populator, and cache
    //! tests.

    /// Minimal RDF/XML record in the corpus's shape.
    pub(crate) fn sample_record(etext: u64, title: &str, author: &str) -> Vec<u8> {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns:dcterms="http://purl.org/dc/terms/"
         xmlns:pgterms="http://www.gutenberg.org/2009/pgterms/">
  <pgterms:ebook rdf:about="ebooks/{etext}">
    <dcterms:title>{title}</dcterms:title>
    <dcterms:creator>
      <pgterms:agent rdf:about="2009/agents/{etext}">
        <pgterms:alias>{author}</pgterms:alias>
      </pgterms:agent>
    </dcterms:creator>
    <dcterms:language>
      <rdf:Description>
        <rdf:value>en</rdf:value>
      </rdf:Description>
    </dcterms:language>
    <dcterms:subject>
      <rdf:Description>
        <rdf:value>Whaling -- Fiction</rdf:value>
      </rdf:Description>
    </dcterms:subject>
    <dcterms:subject>
      <rdf:Description>
        <rdf:value>Sea stories</rdf:value>
      </rdf:Description>
    </dcterms:subject>
    <dcterms:rights>Public domain in the USA.</dcterms:rights>
    <dcterms:hasFormat rdf:resource="http://www.gutenberg.org/files/{etext}/{etext}.txt"/>
  </pgterms:ebook>
</rdf:RDF>
"#
        )
        .into_bytes()
    }

    /// Build an in-memory tar archive from `(name, body)` entries.
    pub(crate) fn tar_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (name, body) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *body).unwrap();
        }
        builder.into_inner().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testutil::{sample_record, tar_of};
    use super::*;

    fn collect_triples(tar_bytes: &[u8]) -> (Vec<Triple>, ParseStats) {
        let mut triples = Vec::new();
        let stats = stream_records(tar_bytes, |t| {
            triples.push(t);
            ControlFlow::Continue(())
        })
        .unwrap();
        (triples, stats)
    }

    #[test]
    fn parses_one_record_into_normalized_triples() {
        let record = sample_record(2701, "Moby Dick; Or, The Whale", "Melville, Hermann");
        let tar_bytes = tar_of(&[("cache/epub/2701/pg2701.rdf", &record)]);
        let (triples, stats) = collect_triples(&tar_bytes);

        assert_eq!(stats.records, 1);
        assert_eq!(stats.skipped_records, 0);
        assert_eq!(stats.triples as usize, triples.len());

        let id = EtextId::new(2701).unwrap();
        assert!(triples.contains(&Triple::new(id, Predicate::Title, "Moby Dick; Or, The Whale")));
        assert!(triples.contains(&Triple::new(id, Predicate::Author, "Melville, Hermann")));
        assert!(triples.contains(&Triple::new(id, Predicate::Language, "en")));
        assert!(triples.contains(&Triple::new(id, Predicate::Rights, "Public domain in the USA.")));
        assert!(triples.contains(&Triple::new(
            id,
            Predicate::FormatUri,
            "http://www.gutenberg.org/files/2701/2701.txt"
        )));
    }

    #[test]
    fn multi_valued_subjects_yield_one_triple_each() {
        let record = sample_record(2701, "Moby Dick; Or, The Whale", "Melville, Hermann");
        let tar_bytes = tar_of(&[("pg2701.rdf", &record)]);
        let (triples, _) = collect_triples(&tar_bytes);

        let subjects: Vec<_> = triples
            .iter()
            .filter(|t| t.predicate == Predicate::Subject)
            .map(|t| t.value.as_str())
            .collect();
        assert_eq!(subjects.len(), 2);
        assert!(subjects.contains(&"Whaling -- Fiction"));
        assert!(subjects.contains(&"Sea stories"));
    }

    #[test]
    fn malformed_record_is_skipped_not_fatal() {
        let good = sample_record(84, "Frankenstein", "Shelley, Mary");
        let tar_bytes = tar_of(&[
            ("pg1.rdf", b"this is not XML at all".as_slice()),
            ("pg84.rdf", &good),
        ]);
        let (triples, stats) = collect_triples(&tar_bytes);

        assert_eq!(stats.skipped_records, 1);
        assert_eq!(stats.records, 1);
        assert!(
            triples
                .iter()
                .any(|t| t.etext == EtextId::new(84).unwrap() && t.predicate == Predicate::Title)
        );
    }

    #[test]
    fn non_record_entries_are_ignored() {
        let record = sample_record(11, "Alice's Adventures in Wonderland", "Carroll, Lewis");
        let tar_bytes = tar_of(&[
            ("README", b"not a record".as_slice()),
            ("pg11.rdf", &record),
        ]);
        let (_, stats) = collect_triples(&tar_bytes);
        assert_eq!(stats.records, 1);
        assert_eq!(stats.skipped_records, 0);
    }

    #[test]
    fn sink_break_stops_the_stream_early() {
        let a = sample_record(1, "First", "A");
        let b = sample_record(2, "Second", "B");
        let tar_bytes = tar_of(&[("pg1.rdf", a.as_slice()), ("pg2.rdf", b.as_slice())]);

        let mut seen = 0u32;
        let stats = stream_records(tar_bytes.as_slice(), |_| {
            seen += 1;
            ControlFlow::Break(())
        })
        .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(stats.triples, 1);
    }

    #[test]
    fn gzipped_dump_roundtrips_through_catalog_dump() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let record = sample_record(2701, "Moby Dick; Or, The Whale", "Melville, Hermann");
        let tar_bytes = tar_of(&[("pg2701.rdf", &record)]);
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        let gz = encoder.finish().unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rdf-files.tar.gz");
        std::fs::write(&path, gz).unwrap();

        let dump = CatalogDump::open(&path);
        let mut count = 0u32;
        let stats = dump
            .stream(|_| {
                count += 1;
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(stats.records, 1);
        assert!(count > 0);
    }

    #[test]
    fn dump_is_restartable_from_source() {
        let record = sample_record(11, "Alice's Adventures in Wonderland", "Carroll, Lewis");
        let tar_bytes = tar_of(&[("pg11.rdf", &record)]);

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("rdf-files.tar");
        std::fs::write(&path, tar_bytes).unwrap();

        let dump = CatalogDump::open(&path);
        let first = dump.stream(|_| ControlFlow::Continue(())).unwrap();
        let second = dump.stream(|_| ControlFlow::Continue(())).unwrap();
        assert_eq!(first, second);
    }
}
