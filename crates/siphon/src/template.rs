//! 🧩 Templates — turning `topics/{{topic}}/{{partition}}/` into a regex that knows things.
//!
//! 🎬 COLD OPEN — INT. NAMING COMMITTEE — A MEETING THAT COULD HAVE BEEN AN EMAIL
//!
//! "We'll just put the partition in the filename," someone said, years ago.
//! Now there are eleven million objects named like `logs-7-000112.gz` and the only
//! thing between us and chaos is a template string with curly braces in it.
//!
//! This module compiles that template ONCE into a [`ContextExtractor`] and then
//! asks it, for every key the enumerator coughs up, "who are you and where do you belong?"
//!
//! 🧠 Knowledge graph:
//! - Placeholders: `{{topic}}`, `{{partition}}`, `{{start_offset}}`, `{{timestamp}}`.
//!   Parameters after a colon (`{{partition:padding=true}}`) are accepted and ignored.
//! - First `{{partition}}` → named integer group. Later ones, and every `{{timestamp}}`,
//!   are anonymous digit wildcards. Regex named groups must be unique, so first one wins.
//! - Filename-style modes match anywhere in the key. Path mode anchors at the start and
//!   lets the partition segment be anything up to the next `/`, so garbage parses loudly.
//! - No match ⇒ `Ok(None)`. Matched-but-unparseable partition ⇒ `Err(Parse)`.

use regex::Regex;
use serde::Serialize;
use tracing::trace;

use crate::distribution::DistributionMode;
use crate::error::{Result, SiphonError};

pub const TOPIC_PLACEHOLDER: &str = "{{topic}}";
pub const PARTITION_PLACEHOLDER: &str = "{{partition}}";
pub const START_OFFSET_PLACEHOLDER: &str = "{{start_offset}}";
pub const TIMESTAMP_PLACEHOLDER: &str = "{{timestamp}}";

const PARTITION_GROUP: &str = "partition";
const TOPIC_GROUP: &str = "topic";
const START_OFFSET_GROUP: &str = "start_offset";
const DIGITS: &str = r"\d+";

/// 🎯 Routing metadata pulled out of an object key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Context {
    /// 🗝️ The key this context was extracted from.
    pub key: String,
    pub topic: Option<String>,
    pub partition: Option<u32>,
    pub start_offset: Option<u64>,
}

impl Context {
    /// 🚶 A context that knows only its key. What you get without a template.
    pub fn for_key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }
}

/// 🏷️ The placeholders a template may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Topic,
    Partition,
    StartOffset,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(Placeholder),
}

/// 📜 A parsed key-naming template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    raw: String,
    segments: Vec<Segment>,
}

impl Template {
    /// 🔍 Splits the raw template into literal text and placeholders.
    ///
    /// An unknown placeholder is a configuration error: a typo like `{{partiton}}`
    /// should fail at startup, not silently match nothing for a week.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = raw;

        while let Some(open) = rest.find("{{") {
            let after_open = &rest[open + 2..];
            let Some(close) = after_open.find("}}") else {
                break;
            };
            let body = &after_open[..close];
            let variable = body.split(':').next().unwrap_or_default().trim();
            let placeholder = match variable {
                "topic" => Placeholder::Topic,
                "partition" => Placeholder::Partition,
                "start_offset" => Placeholder::StartOffset,
                "timestamp" => Placeholder::Timestamp,
                _ => {
                    return Err(SiphonError::Configuration(format!(
                        "unsupported placeholder '{{{{{body}}}}}' in template '{raw}'"
                    )));
                }
            };
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            segments.push(Segment::Variable(placeholder));
            rest = &after_open[close + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn contains(&self, placeholder: Placeholder) -> bool {
        self.segments
            .iter()
            .any(|segment| *segment == Segment::Variable(placeholder))
    }

    /// ✂️ Everything before the first `{{partition` — taken literally, other
    /// placeholders included. `None` when the template has no partition at all.
    pub fn partition_prefix(&self) -> Option<&str> {
        self.raw
            .find("{{partition")
            .map(|index| &self.raw[..index])
    }

    /// 🏗️ Builds the regex source. `anchored_path` switches on path semantics.
    fn to_regex_source(&self, anchored_path: bool) -> String {
        let mut source = String::new();
        if anchored_path {
            source.push('^');
        }
        let mut seen_topic = false;
        let mut seen_partition = false;
        let mut seen_start_offset = false;

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => source.push_str(&regex::escape(text)),
                Segment::Variable(Placeholder::Topic) if !seen_topic => {
                    seen_topic = true;
                    source.push_str(&format!("(?P<{TOPIC_GROUP}>[A-Za-z0-9._-]+)"));
                }
                Segment::Variable(Placeholder::Topic) => source.push_str("[A-Za-z0-9._-]+"),
                Segment::Variable(Placeholder::Partition) if !seen_partition => {
                    seen_partition = true;
                    if anchored_path {
                        source.push_str(&format!("(?P<{PARTITION_GROUP}>[^/]+)"));
                    } else {
                        source.push_str(&format!("(?P<{PARTITION_GROUP}>{DIGITS})"));
                    }
                }
                Segment::Variable(Placeholder::StartOffset) if !seen_start_offset => {
                    seen_start_offset = true;
                    source.push_str(&format!("(?P<{START_OFFSET_GROUP}>{DIGITS})"));
                }
                Segment::Variable(_) => source.push_str(DIGITS),
            }
        }
        source
    }
}

/// 🔎 A compiled template. Cheap to call, expensive to misconfigure.
#[derive(Debug, Clone)]
pub struct ContextExtractor {
    template: Option<Template>,
    pattern: Option<Regex>,
    target_topic: Option<String>,
}

impl ContextExtractor {
    /// 🔧 Compiles `template` for the given distribution mode.
    ///
    /// Partition modes demand a template with `{{partition}}` in it. Hash and random
    /// modes are happy without one, in which case every key matches.
    pub fn compile(
        template: Option<&str>,
        mode: DistributionMode,
        target_topic: Option<String>,
    ) -> Result<Self> {
        let template = template.map(Template::parse).transpose()?;

        if mode.requires_partition() {
            match &template {
                Some(parsed) if parsed.contains(Placeholder::Partition) => {}
                Some(parsed) => {
                    return Err(SiphonError::Configuration(format!(
                        "template '{}' is missing {PARTITION_PLACEHOLDER}, which the {mode} distribution needs \
                         to pick a partition",
                        parsed.as_str()
                    )));
                }
                None => {
                    return Err(SiphonError::Configuration(format!(
                        "the {mode} distribution needs a template containing {PARTITION_PLACEHOLDER}"
                    )));
                }
            }
        }

        let pattern = match &template {
            Some(parsed) => {
                let source = parsed.to_regex_source(mode == DistributionMode::PathPartition);
                let compiled = Regex::new(&source).map_err(|err| {
                    SiphonError::Configuration(format!(
                        "template '{}' compiled to an invalid pattern '{source}': {err}",
                        parsed.as_str()
                    ))
                })?;
                Some(compiled)
            }
            None => None,
        };

        Ok(Self {
            template,
            pattern,
            target_topic,
        })
    }

    pub fn template(&self) -> Option<&Template> {
        self.template.as_ref()
    }

    /// 🎯 Matches `key` against the compiled template.
    ///
    /// `Ok(None)` is the boring, common case of "not one of ours".
    pub fn extract(&self, key: &str) -> Result<Option<Context>> {
        let Some(pattern) = &self.pattern else {
            let mut context = Context::for_key(key);
            context.topic = self.target_topic.clone();
            return Ok(Some(context));
        };

        let Some(captures) = pattern.captures(key) else {
            trace!("🙅 key '{key}' does not match the template");
            return Ok(None);
        };

        let partition = match captures.name(PARTITION_GROUP) {
            Some(matched) => Some(matched.as_str().parse::<u32>().map_err(|err| {
                SiphonError::Parse {
                    key: key.to_string(),
                    reason: format!("partition segment '{}' is not an integer: {err}", matched.as_str()),
                }
            })?),
            None => None,
        };

        let start_offset = match captures.name(START_OFFSET_GROUP) {
            Some(matched) => Some(matched.as_str().parse::<u64>().map_err(|err| {
                SiphonError::Parse {
                    key: key.to_string(),
                    reason: format!("start offset '{}' is not an integer: {err}", matched.as_str()),
                }
            })?),
            None => None,
        };

        let topic = captures
            .name(TOPIC_GROUP)
            .map(|matched| matched.as_str().to_string())
            .or_else(|| self.target_topic.clone());

        Ok(Some(Context {
            key: key.to_string(),
            topic,
            partition,
            start_offset,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filename_extractor(template: &str) -> ContextExtractor {
        ContextExtractor::compile(Some(template), DistributionMode::FilenamePartition, None)
            .expect("💀 template should compile")
    }

    #[test]
    fn the_one_where_logs_1_reveals_partition_1() -> anyhow::Result<()> {
        let the_extractor = filename_extractor("logs-{{partition}}-{{start_offset}}");
        let the_context = the_extractor
            .extract("logs-1-00112.gz")?
            .expect("should match");
        assert_eq!(the_context.partition, Some(1));
        assert_eq!(the_context.start_offset, Some(112));
        assert_eq!(the_context.key, "logs-1-00112.gz");
        Ok(())
    }

    #[test]
    fn the_one_where_every_reasonable_filename_finds_its_partition() -> anyhow::Result<()> {
        let the_cases = [
            ("logs-{{partition}}-{{start_offset}}", "logs-1-00112.gz", 1),
            ("logs-2024-{{timestamp}}-{{partition}}-{{start_offset}}", "logs-2024-20220201-1-00112.gz", 1),
            ("logs-2023-{{partition}}-{{start_offset}}", "logs-2023-1-00112.gz", 1),
            (
                "logs1-{{timestamp}}-{{timestamp}}-{{timestamp}}-{{partition}}-{{start_offset}}",
                "logs1-2022-10-02-10-00112.gz",
                10,
            ),
            ("8952{{partition}}-{{start_offset}}", "89521-00112.gz", 1),
            ("Emergency-TEST{{partition}}-{{start_offset}}", "Emergency-TEST1-00112.gz", 1),
            ("DEV_team_{{partition}}-{{start_offset}}", "DEV_team_1-00112.gz", 1),
            ("logs-{{partition}}-{{start_offset}}", "topics/logs/7/logs-7-0002.txt", 7),
        ];
        for (template, key, expected) in the_cases {
            let the_context = filename_extractor(template)
                .extract(key)?
                .unwrap_or_else(|| panic!("💀 '{key}' should match '{template}'"));
            assert_eq!(the_context.partition, Some(expected), "{template} vs {key}");
        }
        Ok(())
    }

    #[test]
    fn the_one_where_malformed_filenames_are_politely_ignored() -> anyhow::Result<()> {
        let the_cases = [
            ("different-topic-{{partition}}-{{start_offset}}", "logs-1-00112.gz"),
            (
                "no-seperator-in-date-partition-offset-{{timestamp}}-{{partition}}-{{start_offset}}",
                "no-seperator-in-date-partition-offset-202420220201100112.gz",
            ),
            ("logs-2024-{{timestamp}}-{{partition}}-{{start_offset}}", "logs-20201-1-00112.gz"),
            ("logs-2024-{{timestamp}}{{partition}}-{{start_offset}}", "logs-202011-00112.gz"),
            ("logs-2023-{{partition}}-{{start_offset}}", "logs-2023-one-00112.gz"),
        ];
        for (template, key) in the_cases {
            assert_eq!(filename_extractor(template).extract(key)?, None, "{template} vs {key}");
        }
        Ok(())
    }

    #[test]
    fn the_one_where_the_first_partition_placeholder_wins() -> anyhow::Result<()> {
        let the_extractor = filename_extractor("p{{partition}}-p{{partition}}-{{start_offset}}");
        let the_context = the_extractor.extract("p3-p9-100.txt")?.expect("should match");
        assert_eq!(the_context.partition, Some(3));
        Ok(())
    }

    #[test]
    fn the_one_where_partition_modes_refuse_templates_without_partition() {
        let the_result =
            ContextExtractor::compile(Some("logs-23-<partition>-<start_offset>"), DistributionMode::FilenamePartition, None);
        assert!(matches!(the_result, Err(SiphonError::Configuration(_))));

        let the_result = ContextExtractor::compile(None, DistributionMode::PathPartition, None);
        assert!(matches!(the_result, Err(SiphonError::Configuration(_))));
    }

    #[test]
    fn the_one_where_typos_in_placeholders_fail_fast() {
        let the_result = Template::parse("logs-{{partiton}}-{{start_offset}}");
        assert!(matches!(the_result, Err(SiphonError::Configuration(_))));
    }

    #[test]
    fn the_one_where_topic_comes_from_the_key_or_the_config() -> anyhow::Result<()> {
        let the_extractor = ContextExtractor::compile(
            Some("{{topic}}-{{partition}}-{{start_offset}}"),
            DistributionMode::Hash,
            Some("fallback".to_string()),
        )?;
        let the_context = the_extractor.extract("my-topic-1-00112.gz")?.expect("should match");
        assert_eq!(the_context.topic.as_deref(), Some("my-topic"));
        assert_eq!(the_context.partition, Some(1));

        let the_topicless = ContextExtractor::compile(
            Some("logs-{{partition}}-{{start_offset}}"),
            DistributionMode::Hash,
            Some("fallback".to_string()),
        )?;
        let the_context = the_topicless.extract("logs-4-1.gz")?.expect("should match");
        assert_eq!(the_context.topic.as_deref(), Some("fallback"));
        Ok(())
    }

    #[test]
    fn the_one_where_no_template_means_everyone_is_welcome() -> anyhow::Result<()> {
        let the_extractor = ContextExtractor::compile(None, DistributionMode::Random, None)?;
        let the_context = the_extractor.extract("anImage8-0002.png")?.expect("always matches");
        assert_eq!(the_context, Context::for_key("anImage8-0002.png"));
        Ok(())
    }

    #[test]
    fn the_one_where_a_path_partition_of_garbage_is_a_parse_error() -> anyhow::Result<()> {
        let the_extractor =
            ContextExtractor::compile(Some("topics/logs/{{partition}}/"), DistributionMode::PathPartition, None)?;
        let the_context = the_extractor.extract("topics/logs/5/logs-0002.txt")?.expect("should match");
        assert_eq!(the_context.partition, Some(5));

        assert_eq!(the_extractor.extract("prod/logs/4/logs-0002.txt")?, None);
        assert!(matches!(
            the_extractor.extract("topics/logs/one/test.txt"),
            Err(SiphonError::Parse { .. })
        ));
        Ok(())
    }

    #[test]
    fn the_one_where_an_overflowing_partition_is_not_swept_under_the_rug() {
        let the_extractor = filename_extractor("logs-{{partition}}-{{start_offset}}");
        let the_result = the_extractor.extract("logs-99999999999999-1.gz");
        assert!(matches!(the_result, Err(SiphonError::Parse { .. })));
    }

    #[test]
    fn the_one_where_the_prefix_is_taken_literally() -> anyhow::Result<()> {
        let the_template = Template::parse("topics/logs/partition={{partition:padding=true}}/")?;
        assert_eq!(the_template.partition_prefix(), Some("topics/logs/partition="));
        assert!(the_template.contains(Placeholder::Partition));
        assert!(!the_template.contains(Placeholder::Topic));
        Ok(())
    }
}
