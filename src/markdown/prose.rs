//! Rewording of long prose runs through the text service.
//!
//! Images and fenced code blocks split the document into runs; links stay
//! part of the run around them. Runs at least `min_len` bytes long are sent
//! to the service and replaced by its answer. A failed run is kept as is.

use super::segment::segment;
use crate::{debug, front_matter::tagger::Tagger};

/// Outcome of a prose rewrite: the new document and tags gathered on the way.
#[derive(Debug, Default)]
pub struct ProseRewrite {
    pub content: String,
    pub tags: Vec<String>,
    pub rewritten: usize,
}

pub fn rewrite_prose(doc: &str, min_len: usize, tagger: &dyn Tagger) -> ProseRewrite {
    let mut result = ProseRewrite {
        content: String::with_capacity(doc.len()),
        ..Default::default()
    };
    let mut run = String::new();

    let flush_run = |run: &mut String, result: &mut ProseRewrite| {
        if run.trim().len() >= min_len {
            match tagger.rewrite(run) {
                Ok(rewrite) => {
                    result.content.push_str(&rewrite.content);
                    if run.ends_with('\n') && !rewrite.content.ends_with('\n') {
                        result.content.push('\n');
                    }
                    for tag in rewrite.tags {
                        if !result.tags.contains(&tag) {
                            result.tags.push(tag);
                        }
                    }
                    result.rewritten += 1;
                }
                Err(err) => {
                    debug!("tagger"; "keeping prose run: {err}");
                    result.content.push_str(run);
                }
            }
        } else {
            result.content.push_str(run);
        }
        run.clear();
    };

    for seg in segment(doc) {
        if seg.is_image() || seg.is_code() {
            flush_run(&mut run, &mut result);
            result.content.push_str(seg.raw());
        } else {
            run.push_str(seg.raw());
        }
    }
    flush_run(&mut run, &mut result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front_matter::tagger::{Rewrite, Suggestion, TaggerError};
    use parking_lot::Mutex;

    /// Upper-cases whatever it is given and records the inputs.
    #[derive(Default)]
    struct Shouter {
        seen: Mutex<Vec<String>>,
        broken: bool,
    }

    impl Tagger for Shouter {
        fn suggest(&self, _input: &str) -> Result<Suggestion, TaggerError> {
            Err(TaggerError::Malformed("unused".into()))
        }

        fn rewrite(&self, text: &str) -> Result<Rewrite, TaggerError> {
            self.seen.lock().push(text.to_owned());
            if self.broken {
                return Err(TaggerError::Malformed("nope".into()));
            }
            Ok(Rewrite {
                content: text.trim_end().to_uppercase(),
                tags: vec!["loud".into()],
            })
        }
    }

    #[test]
    fn test_runs_split_at_images_and_code() {
        let tagger = Shouter::default();
        let doc = "long prose [l](http://a.com)\n![i](a.png)\nshort\n```\ncode here\n```\nmore prose\n";
        let out = rewrite_prose(doc, 10, &tagger);

        assert_eq!(
            out.content,
            "LONG PROSE [L](HTTP://A.COM)\n![i](a.png)\nshort\n```\ncode here\n```\nMORE PROSE\n"
        );
        assert_eq!(out.rewritten, 2);
        assert_eq!(out.tags, vec!["loud"]);
        let seen = tagger.seen.lock();
        assert!(seen.iter().all(|s| !s.contains("code here") && !s.contains("a.png")));
    }

    #[test]
    fn test_short_document_untouched() {
        let tagger = Shouter::default();
        let out = rewrite_prose("tiny", 300, &tagger);
        assert_eq!(out.content, "tiny");
        assert!(tagger.seen.lock().is_empty());
    }

    #[test]
    fn test_failure_keeps_run() {
        let tagger = Shouter {
            broken: true,
            ..Default::default()
        };
        let doc = "a long enough run of words\n";
        let out = rewrite_prose(doc, 5, &tagger);
        assert_eq!(out.content, doc);
        assert_eq!(out.rewritten, 0);
    }
}
