//! Best matching phrase.
//!
//! Picks the window of `windowsize` positions holding the most distinct match
//! features (then the most matches, then the earliest start), widens it to
//! sentence boundaries up to `sentencesize` tokens and returns its text from
//! the forward index with matches highlighted. Documents without a usable
//! match yield the start of the document instead.
//!
//! Features with a document frequency above `maxdf` times the collection
//! size are too common to locate a phrase and are ignored.

use std::collections::BTreeSet;

use crate::error::{QuarryError, Result};
use crate::index::forward::ForwardEntry;
use crate::index::snapshot::Snapshot;
use crate::index::types::{DocNo, Position};
use crate::query::eval::{EvalContext, FeatureIterator};
use crate::query::posting::Span;
use crate::query::result::SummaryElement;
use crate::query::summarizer::{SummarizerExecution, SummarizerFunction};
use crate::query::weighting::FunctionConfig;

/// Opening and closing text around a marked region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Marker {
    pub open: String,
    pub close: String,
}

impl Marker {
    /// Parse `"$<b>$</b>"`: the first character separates the two parts.
    pub fn parse(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let Some(separator) = chars.next() else {
            return Ok(Marker::default());
        };
        let rest: String = chars.collect();
        match rest.split_once(separator) {
            Some((open, close)) => Ok(Marker {
                open: open.to_string(),
                close: close.to_string(),
            }),
            None => Err(QuarryError::config(format!(
                "marker '{text}' must have the form <sep>open<sep>close"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MatchPhraseSummarizer {
    term_type: String,
    window_size: usize,
    sentence_size: usize,
    paragraph_size: Position,
    cardinality: usize,
    max_df: f64,
    match_mark: Marker,
    floating_mark: Marker,
    phrase_name: String,
    para_name: String,
    docstart_name: String,
    match_set: String,
    title_set: Option<String>,
    debug: Option<String>,
}

impl MatchPhraseSummarizer {
    pub const PARAMS: &'static [&'static str] = &[
        "type",
        "windowsize",
        "sentencesize",
        "paragraphsize",
        "cardinality",
        "maxdf",
        "matchmark",
        "floatingmark",
        "name_phrase",
        "name_para",
        "name_docstart",
        "match",
        "title",
    ];

    pub fn from_config(config: &FunctionConfig) -> Result<Self> {
        config.check_known(Self::PARAMS)?;
        let positive = |key: &str, default: f64| -> Result<usize> {
            let value = config.number(key, default)?;
            if value < 1.0 {
                return Err(QuarryError::config(format!("matchphrase: '{key}' must be at least 1")));
            }
            Ok(value as usize)
        };
        Ok(MatchPhraseSummarizer {
            term_type: config.required_text("type")?,
            window_size: positive("windowsize", 30.0)?,
            sentence_size: positive("sentencesize", 40.0)?,
            paragraph_size: positive("paragraphsize", 300.0)? as Position,
            cardinality: config.number("cardinality", 0.0)?.max(0.0) as usize,
            max_df: config.number("maxdf", 0.1)?,
            match_mark: Marker::parse(&config.text("matchmark")?.unwrap_or_default())?,
            floating_mark: Marker::parse(&config.text("floatingmark")?.unwrap_or_else(|| "$... $ ...".to_string()))?,
            phrase_name: config.text("name_phrase")?.unwrap_or_else(|| "phrase".to_string()),
            para_name: config.text("name_para")?.unwrap_or_else(|| "para".to_string()),
            docstart_name: config.text("name_docstart")?.unwrap_or_else(|| "docstart".to_string()),
            match_set: config
                .feature_set("match")?
                .ok_or_else(|| QuarryError::config("matchphrase needs a 'match' feature set"))?,
            title_set: config.feature_set("title")?,
            debug: config.debug_name()?,
        })
    }
}

impl SummarizerFunction for MatchPhraseSummarizer {
    fn name(&self) -> &str {
        "matchphrase"
    }

    fn describe(&self) -> String {
        let mut out = format!(
            "matchphrase( type='{}', matchmark=({},{}), floatingmark=({},{}), name para={}, name phrase={}, \
             name docstart={}, paragraphsize={}, sentencesize={}, windowsize={}, cardinality='{}', maxdf='{}', match= %{}",
            self.term_type,
            self.match_mark.open,
            self.match_mark.close,
            self.floating_mark.open,
            self.floating_mark.close,
            self.para_name,
            self.phrase_name,
            self.docstart_name,
            self.paragraph_size,
            self.sentence_size,
            self.window_size,
            self.cardinality,
            self.max_df,
            self.match_set
        );
        if let Some(title) = &self.title_set {
            out.push_str(&format!(", title= %{title}"));
        }
        out.push(')');
        out
    }

    fn debug_name(&self) -> Option<&str> {
        self.debug.as_deref()
    }

    fn instance(&self, ctx: &EvalContext<'_>) -> Result<Box<dyn SummarizerExecution>> {
        let limit = self.max_df * ctx.nof_documents() as f64;
        let features = ctx
            .features(&self.match_set)?
            .into_iter()
            .filter(|f| f.document_frequency as f64 <= limit)
            .collect();
        let title = match &self.title_set {
            Some(set) => ctx.features(set)?,
            None => Vec::new(),
        };
        Ok(Box::new(MatchPhraseExecution {
            config: self.clone(),
            features,
            title,
        }))
    }
}

/// A match of one feature.
#[derive(Debug, Clone, Copy)]
struct Hit {
    span: Span,
    feature: usize,
}

#[derive(Debug)]
struct MatchPhraseExecution {
    config: MatchPhraseSummarizer,
    features: Vec<FeatureIterator>,
    title: Vec<FeatureIterator>,
}

fn ends_sentence(token: &ForwardEntry) -> bool {
    token.value.ends_with(['.', '!', '?', ';'])
}

fn first_span(features: &mut [FeatureIterator], docno: DocNo) -> Option<Span> {
    let mut first: Option<Span> = None;
    for f in features.iter_mut() {
        if f.iterator.skip_doc(docno) != docno {
            continue;
        }
        if let Some(span) = f.iterator.spans().first().copied() {
            first = Some(first.map_or(span, |s| s.min(span)));
        }
    }
    first
}

impl MatchPhraseExecution {
    fn hits(&mut self, docno: DocNo) -> Vec<Hit> {
        let mut hits = Vec::new();
        for (feature, f) in self.features.iter_mut().enumerate() {
            if f.iterator.skip_doc(docno) == docno {
                hits.extend(f.iterator.spans().into_iter().map(|span| Hit { span, feature }));
            }
        }
        hits.sort_by_key(|h| (h.span.start, h.feature));
        hits
    }

    /// The best window as (first match start, end of last match).
    fn best_window(&self, hits: &[Hit]) -> Option<(Position, Position)> {
        let window = self.config.window_size as Position;
        let mut best: Option<((usize, usize), Position, Position)> = None;
        for (idx, first) in hits.iter().enumerate() {
            let start = first.span.start;
            let inside: Vec<&Hit> = hits[idx..]
                .iter()
                .take_while(|h| h.span.start < start.saturating_add(window))
                .collect();
            let distinct: BTreeSet<usize> = inside.iter().map(|h| h.feature).collect();
            let score = (distinct.len(), inside.len());
            let end = inside.iter().map(|h| h.span.end()).max().unwrap_or(start.saturating_add(1));
            let end = end.min(start.saturating_add(window));
            if best.as_ref().is_none_or(|(s, _, _)| score > *s) {
                best = Some((score, start, end));
            }
        }
        let ((distinct, _), start, end) = best?;
        (distinct >= self.config.cardinality.max(1)).then_some((start, end))
    }

    fn render(&self, tokens: &[ForwardEntry], first: usize, last: usize, hits: &[Hit]) -> String {
        let marked = |pos: Position| hits.iter().any(|h| h.span.start <= pos && pos < h.span.end());
        let mark = &self.config.match_mark;
        let mut out = String::new();
        if first > 0 {
            out.push_str(&self.config.floating_mark.open);
        }
        let mut in_mark = false;
        for (idx, token) in tokens[first..=last].iter().enumerate() {
            let hit = marked(token.position);
            if idx > 0 {
                if in_mark && !hit {
                    out.push_str(&mark.close);
                    in_mark = false;
                }
                out.push(' ');
            }
            if hit && !in_mark {
                out.push_str(&mark.open);
                in_mark = true;
            }
            out.push_str(&token.value);
        }
        if in_mark {
            out.push_str(&mark.close);
        }
        if last + 1 < tokens.len() {
            out.push_str(&self.config.floating_mark.close);
        }
        out
    }

    fn docstart(&self, tokens: &[ForwardEntry]) -> Option<SummaryElement> {
        if tokens.is_empty() {
            return None;
        }
        let mut last = 0;
        while last + 1 < tokens.len() && !ends_sentence(&tokens[last]) && last + 1 < self.config.sentence_size {
            last += 1;
        }
        Some(SummaryElement::new(
            self.config.docstart_name.clone(),
            self.render(tokens, 0, last, &[]),
        ))
    }
}

impl SummarizerExecution for MatchPhraseExecution {
    fn summarize(&mut self, snapshot: &Snapshot, docno: DocNo) -> Result<Vec<SummaryElement>> {
        let Some(doc) = snapshot.document(docno) else {
            return Ok(Vec::new());
        };
        let tokens = doc.forward_terms(&self.config.term_type);
        let hits = self.hits(docno);
        let Some((start, end)) = self.best_window(&hits) else {
            return Ok(self.docstart(tokens).into_iter().collect());
        };

        let mut first = tokens.partition_point(|t| t.position < start);
        if first >= tokens.len() {
            return Ok(self.docstart(tokens).into_iter().collect());
        }
        let mut last = tokens.partition_point(|t| t.position < end).saturating_sub(1).max(first);
        let size = self.config.sentence_size;
        while first > 0 && !ends_sentence(&tokens[first - 1]) && last - first + 1 < size {
            first -= 1;
        }
        while last + 1 < tokens.len() && !ends_sentence(&tokens[last]) && last - first + 1 < size {
            last += 1;
        }

        let mut elements = Vec::new();
        if let Some(title) = first_span(&mut self.title, docno) {
            let phrase_start = tokens[first].position;
            if phrase_start >= title.end() && phrase_start - title.end() <= self.config.paragraph_size {
                let text = doc.text_between(&self.config.term_type, title.start, title.end() - 1);
                if !text.is_empty() {
                    elements.push(SummaryElement::new(self.config.para_name.clone(), text));
                }
            }
        }
        let in_window: Vec<Hit> = hits
            .into_iter()
            .filter(|h| h.span.start >= start && h.span.start < end)
            .collect();
        let distinct: BTreeSet<usize> = in_window.iter().map(|h| h.feature).collect();
        elements.push(
            SummaryElement::new(
                self.config.phrase_name.clone(),
                self.render(tokens, first, last, &in_window),
            )
            .with_weight(distinct.len() as f64),
        );
        Ok(elements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<ForwardEntry> {
        text.split_whitespace()
            .enumerate()
            .map(|(idx, value)| ForwardEntry {
                position: idx as Position + 1,
                value: value.to_string(),
            })
            .collect()
    }

    fn execution(params: FunctionConfig) -> MatchPhraseExecution {
        MatchPhraseExecution {
            config: MatchPhraseSummarizer::from_config(&params).unwrap(),
            features: Vec::new(),
            title: Vec::new(),
        }
    }

    fn config() -> FunctionConfig {
        FunctionConfig::new("matchphrase")
            .param("type", "orig")
            .param("windowsize", 3.0)
            .param("sentencesize", 6.0)
            .param("matchmark", "$<b>$</b>")
            .feature("match", "seek")
    }

    #[test]
    fn test_marker() {
        assert_eq!(
            Marker::parse("$<b>$</b>").unwrap(),
            Marker {
                open: "<b>".to_string(),
                close: "</b>".to_string()
            }
        );
        assert_eq!(Marker::parse("").unwrap(), Marker::default());
        assert!(Marker::parse("$<b>").is_err());
    }

    #[test]
    fn test_best_window_prefers_distinct_then_earliest() {
        let exec = execution(config());
        let hit = |start, feature| Hit {
            span: Span::new(start, 1),
            feature,
        };
        let hits = vec![hit(1, 0), hit(2, 0), hit(7, 0), hit(8, 1), hit(20, 0), hit(21, 1)];
        assert_eq!(exec.best_window(&hits), Some((7, 9)));
        assert_eq!(exec.best_window(&[]), None);
    }

    #[test]
    fn test_docstart_and_render() {
        let exec = execution(config());
        let doc = tokens("One day in Tokyo. Tokyo is a city that is large");
        let start = exec.docstart(&doc).unwrap();
        assert_eq!(start.name, "docstart");
        assert_eq!(start.value, "One day in Tokyo. ...");

        let hits = [
            Hit {
                span: Span::new(7, 1),
                feature: 0,
            },
            Hit {
                span: Span::new(8, 1),
                feature: 1,
            },
        ];
        assert_eq!(exec.render(&doc, 4, 8, &hits), "... Tokyo is <b>a city</b> that ...");
    }
}
