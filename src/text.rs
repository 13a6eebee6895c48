//! Full-text acquisition and boilerplate stripping.
//!
//! Each work's plain-text file carries licensing boilerplate before and
//! after the actual text. [`strip_headers`] removes it with a line-marker
//! heuristic; [`MirrorTextSource`] locates and downloads the text from an
//! HTTP mirror, with an optional gzipped on-disk cache so repeated loads
//! never touch the network.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::TextError;
use crate::model::EtextId;

/// Lines beginning with any of these mark the end of the front boilerplate.
const TEXT_START_MARKERS: &[&str] = &[
    "*END*THE SMALL PRINT",
    "*** START OF THE PROJECT GUTENBERG",
    "*** START OF THIS PROJECT GUTENBERG",
    "This etext was prepared by",
    "E-text prepared by",
    "Produced by",
    "Distributed Proofreading Team",
    "Proofreading Team at http://www.pgdp.net",
    "http://gallica.bnf.fr)",
    "      http://archive.org/details/",
    "http://www.pgdp.net",
    "by The Internet Archive)",
    "by The Internet Archive/Canadian Libraries",
    "by The Internet Archive/American Libraries",
    "public domain material from the Internet Archive",
    "Internet Archive)",
    "Internet Archive/Canadian Libraries",
    "Internet Archive/American Libraries",
    "material from the Google Print project",
    "*END THE SMALL PRINT",
    "***START OF THE PROJECT GUTENBERG",
    "This etext was produced by",
    "*** START OF THE COPYRIGHTED",
    "The Project Gutenberg",
    "http://gutenberg.spiegel.de/ erreichbar.",
    "Project Runeberg publishes",
    "Beginning of this Project Gutenberg",
    "Project Gutenberg Online Distributed",
    "Gutenberg Online Distributed",
    "the Project Gutenberg Online Distributed",
    "Gutenberg Distributed Proofreaders",
    "Project Gutenberg Distributed Proofreaders",
    "the Project Gutenberg Online Distributed Proofreading Team",
    "**The Project Gutenberg",
    "*SMALL PRINT!",
    "More information about this book is at the top of this file.",
    "tells you about restrictions in how the file may be used.",
    "l'authorization à les utilizer pour preparer ce texte.",
    "of the etext through OCR.",
    "*****These eBooks Were Prepared By Thousands of Volunteers!*****",
    "We need your donations more than ever!",
    " *** START OF THIS PROJECT GUTENBERG",
    "****     SMALL PRINT!",
    "[\"Small Print\" V.",
    "      (http://www.ibiblio.org/gutenberg/",
    "and the Project Gutenberg Online Distributed Proofreading Team",
    "Mary Meehan, and the Project Gutenberg Online Distributed Proofreading",
    "                this Project Gutenberg edition.",
];

/// Lines beginning with any of these mark the start of the tail boilerplate.
const TEXT_END_MARKERS: &[&str] = &[
    "*** END OF THE PROJECT GUTENBERG",
    "*** END OF THIS PROJECT GUTENBERG",
    "***END OF THE PROJECT GUTENBERG",
    "End of the Project Gutenberg",
    "End of The Project Gutenberg",
    "Ende dieses Project Gutenberg",
    "by Project Gutenberg",
    "End of Project Gutenberg",
    "End of this Project Gutenberg",
    "Ende dieses Projekt Gutenberg",
    "        ***END OF THE PROJECT GUTENBERG",
    "*** END OF THE COPYRIGHTED",
    "End of this is COPYRIGHTED",
    "Ende dieses Etextes ",
    "Ende dieses Project Gutenber",
    "Ende diese Project Gutenberg",
    "**This is a COPYRIGHTED Project Gutenberg Etext, Details Above**",
    "Fin de Project Gutenberg",
    "The Project Gutenberg Etext of ",
    "Ce document fut presente en lecture",
    "Ce document fut présenté en lecture",
    "More information about this book is at the top of this file.",
    "We need your donations more than ever!",
    "END OF PROJECT GUTENBERG",
    " End of the Project Gutenberg",
    " *** END OF THIS PROJECT GUTENBERG",
];

const LEGALESE_START_MARKERS: &[&str] = &["<<THIS ELECTRONIC VERSION OF"];
const LEGALESE_END_MARKERS: &[&str] = &["SERVICE THAT CHARGES FOR DOWNLOAD"];

/// Header markers are only honored inside the first lines of a file.
const HEADER_WINDOW: usize = 600;
/// Footer markers are only honored after this many body lines, so a short
/// quoted marker near the top cannot truncate the whole text.
const FOOTER_GUARD: usize = 100;

fn starts_with_any(line: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| line.starts_with(m))
}

/// Remove the licensing boilerplate surrounding a work's plain text.
///
/// Line-marker heuristic: the last header marker seen inside the first
/// [`HEADER_WINDOW`] lines discards everything before it; the first footer
/// marker after [`FOOTER_GUARD`] body lines ends the text; inline legalese
/// sections between their start and end markers are dropped wherever they
/// appear.
pub fn strip_headers(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut kept = 0usize;
    let mut in_legalese = false;
    let mut footer_found = false;

    for line in text.lines() {
        if kept <= HEADER_WINDOW && starts_with_any(line, TEXT_START_MARKERS) {
            // Everything so far was front matter.
            out.clear();
            continue;
        }

        if kept >= FOOTER_GUARD {
            if !footer_found {
                footer_found = starts_with_any(line, TEXT_END_MARKERS);
            }
            if footer_found {
                break;
            }
        }

        if starts_with_any(line, LEGALESE_START_MARKERS) {
            in_legalese = true;
            continue;
        }
        if starts_with_any(line, LEGALESE_END_MARKERS) {
            in_legalese = false;
            continue;
        }

        if !in_legalese {
            out.push(line);
            kept += 1;
        }
    }

    out.join("\n")
}

/// A source of full plain texts, keyed by etext id.
pub trait TextSource {
    fn fetch(&self, etext: EtextId) -> Result<String, TextError>;
}

/// Suffix variants probed on the mirror, in priority order: plain ASCII,
/// then the 8-bit and UTF-8 editions.
const EXTENSIONS: &[&str] = &[".txt", "-8.txt", "-0.txt"];

const DEFAULT_MIRROR: &str = "http://aleph.gutenberg.org";

/// Downloads plain texts from an HTTP mirror, optionally caching them
/// gzipped on disk.
pub struct MirrorTextSource {
    agent: ureq::Agent,
    mirror: String,
    cache_dir: Option<PathBuf>,
}

impl MirrorTextSource {
    /// Use `mirror` as the download root (no trailing slash needed).
    pub fn new(mirror: impl Into<String>) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(60))
            .build();
        Self {
            agent,
            mirror: mirror.into().trim_end_matches('/').to_string(),
            cache_dir: None,
        }
    }

    /// The default public mirror, overridable with `GUTENBERG_MIRROR`.
    pub fn default_mirror() -> Self {
        let mirror =
            std::env::var("GUTENBERG_MIRROR").unwrap_or_else(|_| DEFAULT_MIRROR.to_string());
        Self::new(mirror)
    }

    /// Cache downloaded texts gzipped under `dir`.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Mirrors shard texts into one directory per leading digit:
    /// `1` → `0/1`, `19` → `1/19`, `15453` → `1/5/4/5/15453`.
    fn uri_subdirectory(etext: EtextId) -> String {
        let digits = format!("{:02}", etext.get());
        let mut parts: Vec<String> = digits[..digits.len() - 1]
            .chars()
            .map(|c| c.to_string())
            .collect();
        parts.push(etext.get().to_string());
        parts.join("/")
    }

    /// Probe the known file-name variants and return the first that exists.
    fn resolve_uri(&self, etext: EtextId) -> Result<String, TextError> {
        let root = format!("{}/{}", self.mirror, Self::uri_subdirectory(etext));
        for ext in EXTENSIONS {
            let uri = format!("{root}/{}{ext}", etext.get());
            match self.agent.head(&uri).call() {
                Ok(_) => return Ok(uri),
                Err(ureq::Error::Status(_, _)) => continue,
                Err(e) => {
                    return Err(TextError::Fetch {
                        message: e.to_string(),
                    });
                }
            }
        }
        Err(TextError::UnknownDownloadUri {
            etext: etext.get(),
            mirror: self.mirror.clone(),
        })
    }

    fn cache_path(&self, etext: EtextId) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.txt.gz", etext.get())))
    }

    fn read_cached(&self, etext: EtextId) -> Option<String> {
        let path = self.cache_path(etext)?;
        let file = std::fs::File::open(path).ok()?;
        let mut text = String::new();
        GzDecoder::new(file).read_to_string(&mut text).ok()?;
        Some(text)
    }

    fn write_cached(&self, etext: EtextId, text: &str) {
        let Some(path) = self.cache_path(etext) else {
            return;
        };
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::File::create(&path)?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(text.as_bytes())?;
            encoder.finish()?;
            Ok(())
        })();
        if let Err(e) = result {
            // The cache is an optimization; a failed write only costs a
            // re-download next time.
            tracing::warn!(path = %path.display(), error = %e, "could not cache text");
        }
    }
}

impl TextSource for MirrorTextSource {
    fn fetch(&self, etext: EtextId) -> Result<String, TextError> {
        if let Some(text) = self.read_cached(etext) {
            tracing::debug!(%etext, "text served from cache");
            return Ok(text);
        }

        let uri = self.resolve_uri(etext)?;
        tracing::info!(%etext, uri, "downloading text");
        let text = self
            .agent
            .get(&uri)
            .call()
            .map_err(|e| TextError::Fetch {
                message: e.to_string(),
            })?
            .into_string()
            .map_err(|e| TextError::Fetch {
                message: e.to_string(),
            })?;

        self.write_cached(etext, &text);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> EtextId {
        EtextId::new(raw).unwrap()
    }

    #[test]
    fn strips_front_matter_up_to_the_start_marker() {
        let text = "The Project Gutenberg eBook of Moby Dick\n\
                    Some legal text\n\
                    *** START OF THE PROJECT GUTENBERG EBOOK MOBY DICK ***\n\
                    Call me Ishmael.\n";
        assert_eq!(strip_headers(text), "Call me Ishmael.");
    }

    #[test]
    fn strips_tail_matter_from_the_end_marker() {
        let body: String = (0..150)
            .map(|i| format!("body line {i}\n"))
            .collect();
        let text = format!(
            "{body}*** END OF THE PROJECT GUTENBERG EBOOK ***\ndonation plea\n"
        );
        let stripped = strip_headers(&text);
        assert!(stripped.ends_with("body line 149"));
        assert!(!stripped.contains("donation plea"));
    }

    #[test]
    fn footer_marker_near_the_top_is_ignored() {
        // A quoted end marker inside the first lines must not truncate.
        let mut text = String::from("End of the Project Gutenberg quote in the preface\n");
        for i in 0..150 {
            text.push_str(&format!("line {i}\n"));
        }
        let stripped = strip_headers(&text);
        assert!(stripped.contains("line 149"));
    }

    #[test]
    fn inline_legalese_sections_are_dropped() {
        let text = "before\n\
                    <<THIS ELECTRONIC VERSION OF THE WORK IS RESTRICTED>>\n\
                    fine print\n\
                    SERVICE THAT CHARGES FOR DOWNLOAD of this work\n\
                    after\n";
        assert_eq!(strip_headers(text), "before\nafter");
    }

    #[test]
    fn text_without_markers_passes_through() {
        let text = "Call me Ishmael.\nSome years ago.";
        assert_eq!(strip_headers(text), text);
    }

    #[test]
    fn last_start_marker_wins() {
        let text = "Produced by someone\n\
                    intro\n\
                    *** START OF THE PROJECT GUTENBERG EBOOK ***\n\
                    the text\n";
        assert_eq!(strip_headers(text), "the text");
    }

    #[test]
    fn uri_subdirectory_shards_by_digit() {
        assert_eq!(MirrorTextSource::uri_subdirectory(id(1)), "0/1");
        assert_eq!(MirrorTextSource::uri_subdirectory(id(19)), "1/19");
        assert_eq!(MirrorTextSource::uri_subdirectory(id(2701)), "2/7/0/2701");
        assert_eq!(MirrorTextSource::uri_subdirectory(id(15453)), "1/5/4/5/15453");
    }

    #[test]
    fn mirror_trailing_slash_is_normalized() {
        let source = MirrorTextSource::new("http://mirror.example/");
        assert_eq!(source.mirror, "http://mirror.example");
    }

    #[test]
    fn cache_roundtrips_gzipped_text() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = MirrorTextSource::new("http://mirror.example").with_cache_dir(dir.path());
        source.write_cached(id(2701), "Call me Ishmael.");
        assert_eq!(
            source.read_cached(id(2701)).as_deref(),
            Some("Call me Ishmael.")
        );
    }

    #[test]
    fn unreachable_mirror_is_a_fetch_error() {
        let source = MirrorTextSource::new("http://127.0.0.1:1");
        let err = source.fetch(id(2701)).unwrap_err();
        assert!(matches!(err, TextError::Fetch { .. }));
    }
}
