//! File name templates: a [`FileNameTemplate`] both parses sample metadata out of file names and
//! generates file names from sample metadata.
//!
//! A template is literal text interleaved with fields written as `{name}` or `{name:width}`.
//! Literal braces are written as `{{` and `}}`.  A field given a width matches exactly that
//! many characters.  A field that appears more than once must capture identical text at every
//! occurrence.

use std::collections::BTreeMap;

use ahash::AHashMap;
use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;

use crate::errors::{Result, SequenceDataError};

lazy_static! {
    /// Escaped braces or a `{field}` / `{field:width}` placeholder.
    static ref FIELD_REGEX: Regex = Regex::new(r"\{\{|\}\}|\{\w*(?:\.\w+)*(?::[^}]+)?\}").unwrap();
    static ref FIELD_NAME_REGEX: Regex = Regex::new(r"^\w+$").unwrap();
}

/// A value used to fill a template field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateValue {
    /// Substituted as is.
    Single(String),
    /// Expanded: one file name is generated per element.
    Multiple(Vec<String>),
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for TemplateValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

impl From<&[&str]> for TemplateValue {
    fn from(values: &[&str]) -> Self {
        Self::Multiple(values.iter().map(|v| (*v).to_string()).collect())
    }
}

/// The values used to fill a template, keyed by field name.
pub type TemplateValues = BTreeMap<String, TemplateValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Field { name: String, width: Option<usize> },
}

/// A compiled file name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNameTemplate {
    template: String,
    tokens: Vec<Token>,
    /// The distinct field names, in order of first appearance.
    fields: Vec<String>,
}

impl FileNameTemplate {
    /// Compile a template.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::InvalidTemplate`] if the template is empty, contains an unnamed
    ///   field, a field name that is not made of word characters, a non-integer width, or an
    ///   unbalanced brace.
    pub fn compile(template: &str) -> Result<Self> {
        let invalid = |reason: &str| SequenceDataError::InvalidTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };
        if template.is_empty() {
            return Err(invalid("expected a non-zero length file name template"));
        }

        let mut tokens = vec![];
        let mut literal = String::new();
        let mut last = 0;
        for found in FIELD_REGEX.find_iter(template) {
            let text = &template[last..found.start()];
            if text.contains('{') || text.contains('}') {
                return Err(invalid("unbalanced brace in template"));
            }
            literal.push_str(text);
            last = found.end();

            match found.as_str() {
                "{{" => literal.push('{'),
                "}}" => literal.push('}'),
                field => {
                    let field = &field[1..field.len() - 1];
                    let (name, width) = match field.split_once(':') {
                        Some((name, width)) => {
                            let width = width.parse::<usize>().map_err(|_| {
                                invalid("the width of a field must be an integer")
                            })?;
                            (name, Some(width))
                        }
                        None => (field, None),
                    };
                    if name.is_empty() {
                        return Err(invalid("a field in the template must have a name"));
                    }
                    if !FIELD_NAME_REGEX.is_match(name) {
                        return Err(invalid("a field name may only contain word characters"));
                    }
                    if !literal.is_empty() {
                        tokens.push(Token::Literal(std::mem::take(&mut literal)));
                    }
                    tokens.push(Token::Field { name: name.to_string(), width });
                }
            }
        }
        let text = &template[last..];
        if text.contains('{') || text.contains('}') {
            return Err(invalid("unbalanced brace in template"));
        }
        literal.push_str(text);
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        let fields = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Field { name, .. } => Some(name.clone()),
                Token::Literal(_) => None,
            })
            .unique()
            .collect();

        Ok(Self { template: template.to_string(), tokens, fields })
    }

    /// The template text this was compiled from.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// The distinct field names, in order of first appearance.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Parse a file name into its field values.
    ///
    /// Matching starts at the beginning of the file name; fields are greedy and any text
    /// remaining after the last template element is ignored.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::TemplateMismatch`] if the file name does not conform.
    pub fn parse(&self, file_name: &str) -> Result<AHashMap<String, String>> {
        let mut captures = vec![];
        if match_tokens(&self.tokens, file_name, &mut captures) {
            Ok(captures
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect())
        } else {
            Err(SequenceDataError::TemplateMismatch {
                template: self.template.clone(),
                file_name: file_name.to_string(),
            })
        }
    }

    /// Generate file names from the given values.
    ///
    /// Every [`TemplateValue::Multiple`] is expanded, one file name per combination of the
    /// multi-valued fields.  Values for names that do not appear in the template are ignored.
    ///
    /// # Errors
    ///
    /// - [`SequenceDataError::UnresolvedTemplate`] if no values were given, if a field of the
    ///   template has no value, or if a value does not fit a fixed-width field.
    pub fn fill(&self, values: &TemplateValues) -> Result<Vec<String>> {
        let unresolved = |reason: String| SequenceDataError::UnresolvedTemplate {
            template: self.template.clone(),
            reason,
        };

        let values: Vec<(&str, &TemplateValue)> = values
            .iter()
            .filter(|(_, v)| !matches!(v, TemplateValue::Multiple(vs) if vs.is_empty()))
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        if values.is_empty() {
            return Err(unresolved("the template values contained only empty values".into()));
        }

        let mut combinations: Vec<AHashMap<&str, &str>> = vec![AHashMap::new()];
        for (name, value) in values {
            match value {
                TemplateValue::Single(v) => {
                    for combination in &mut combinations {
                        combination.insert(name, v.as_str());
                    }
                }
                TemplateValue::Multiple(vs) => {
                    combinations = vs
                        .iter()
                        .flat_map(|v| {
                            combinations.iter().map(move |combination| {
                                let mut combination = combination.clone();
                                combination.insert(name, v.as_str());
                                combination
                            })
                        })
                        .collect();
                }
            }
        }

        combinations
            .iter()
            .map(|combination| {
                let mut file_name = String::new();
                for token in &self.tokens {
                    match token {
                        Token::Literal(text) => file_name.push_str(text),
                        Token::Field { name, width } => {
                            let value = combination.get(name.as_str()).ok_or_else(|| {
                                unresolved(format!("no value for field '{}'", name))
                            })?;
                            if let Some(width) = width {
                                if value.chars().count() != *width {
                                    return Err(unresolved(format!(
                                        "value '{}' for field '{}' is not {} characters wide",
                                        value, name, width
                                    )));
                                }
                            }
                            file_name.push_str(value);
                        }
                    }
                }
                Ok(file_name)
            })
            .collect()
    }
}

/// Byte offsets of every char boundary in `text`, including its end.
fn char_ends(text: &str) -> impl DoubleEndedIterator<Item = usize> + '_ {
    text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len()))
}

/// Possible ends of a capture, longest first.
fn greedy_ends(text: &str) -> impl Iterator<Item = usize> + '_ {
    char_ends(text).rev()
}

/// Backtracking matcher over the template tokens.  On success `captures` holds one entry per
/// distinct field.
fn match_tokens<'a>(
    tokens: &'a [Token],
    text: &'a str,
    captures: &mut Vec<(&'a str, &'a str)>,
) -> bool {
    let (token, rest) = match tokens.split_first() {
        Some(split) => split,
        None => return true,
    };
    match token {
        Token::Literal(literal) => text
            .strip_prefix(literal.as_str())
            .map_or(false, |tail| match_tokens(rest, tail, captures)),
        Token::Field { name, width } => {
            if let Some(&(_, previous)) = captures.iter().find(|(n, _)| *n == name.as_str()) {
                return text
                    .strip_prefix(previous)
                    .map_or(false, |tail| match_tokens(rest, tail, captures));
            }
            let ends: Vec<usize> = match width {
                Some(width) => char_ends(text).nth(*width).into_iter().collect(),
                None => greedy_ends(text).collect(),
            };
            for end in ends {
                captures.push((name.as_str(), &text[..end]));
                if match_tokens(rest, &text[end..], captures) {
                    return true;
                }
                captures.pop();
            }
            false
        }
    }
}

#[cfg(test)]
mod test {
    use rstest::rstest;

    use crate::errors::ErrorCategory;

    use super::{FileNameTemplate, TemplateValue, TemplateValues};

    fn values(pairs: &[(&str, TemplateValue)]) -> TemplateValues {
        pairs.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn test_parse_simple() {
        let template = FileNameTemplate::compile("{sample_name}_{run}_{orientation}.fastq").unwrap();
        let parsed = template.parse("SampleA_run3_F.fastq").unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed["sample_name"], "SampleA");
        assert_eq!(parsed["run"], "run3");
        assert_eq!(parsed["orientation"], "F");
    }

    #[test]
    fn test_fill_expands_multiple_values() {
        let template = FileNameTemplate::compile("{sample_name}_{run}_{orientation}.fastq").unwrap();
        let filled = template
            .fill(&values(&[
                ("sample_name", TemplateValue::from("SampleA")),
                ("run", TemplateValue::from("run3")),
                ("orientation", TemplateValue::from(&["F", "R"][..])),
            ]))
            .unwrap();
        assert_eq!(filled, vec!["SampleA_run3_F.fastq", "SampleA_run3_R.fastq"]);
    }

    #[test]
    fn test_fill_cartesian_product_of_two_fields() {
        let template = FileNameTemplate::compile("{lane}_{orientation}.fq").unwrap();
        let filled = template
            .fill(&values(&[
                ("lane", TemplateValue::from(&["1", "2", "3"][..])),
                ("orientation", TemplateValue::from(&["F", "R"][..])),
            ]))
            .unwrap();
        assert_eq!(filled.len(), 6);
        for name in ["1_F.fq", "1_R.fq", "2_F.fq", "2_R.fq", "3_F.fq", "3_R.fq"] {
            assert!(filled.contains(&name.to_string()));
        }
    }

    #[test]
    fn test_fill_ignores_extra_values() {
        let template = FileNameTemplate::compile("{sample_name}.fastq").unwrap();
        let filled = template
            .fill(&values(&[("sample_name", TemplateValue::from("s1")), ("run", TemplateValue::from("r1"))]))
            .unwrap();
        assert_eq!(filled, vec!["s1.fastq"]);
    }

    #[rstest]
    #[case("{sample_name}_{run}.fastq", &[("sample_name", "S1"), ("run", "007")])]
    #[case("{run:3}{sample_name}.fq.gz", &[("sample_name", "abc_def"), ("run", "L01")])]
    #[case("pre_{{{sample_name}}}_{orientation:1}", &[("sample_name", "x"), ("orientation", "R")])]
    fn test_parse_fill_round_trip(#[case] template: &str, #[case] pairs: &[(&str, &str)]) {
        let template = FileNameTemplate::compile(template).unwrap();
        let values: TemplateValues =
            pairs.iter().map(|(k, v)| ((*k).to_string(), TemplateValue::from(*v))).collect();
        let filled = template.fill(&values).unwrap();
        assert_eq!(filled.len(), 1);
        let parsed = template.parse(&filled[0]).unwrap();
        assert_eq!(parsed.len(), pairs.len());
        for (k, v) in pairs {
            assert_eq!(&parsed[*k], v);
        }
    }

    #[test]
    fn test_escaped_braces_are_literal() {
        let template = FileNameTemplate::compile("{{{name}}}.fq").unwrap();
        assert_eq!(template.fields(), &["name".to_string()]);
        assert_eq!(template.fill(&values(&[("name", TemplateValue::from("a"))])).unwrap(), vec!["{a}.fq"]);
        assert_eq!(template.parse("{a}.fq").unwrap()["name"], "a");
    }

    #[test]
    fn test_fixed_width_field() {
        let template = FileNameTemplate::compile("{run:4}{sample_name}.fastq").unwrap();
        let parsed = template.parse("L001Sample_1.fastq").unwrap();
        assert_eq!(parsed["run"], "L001");
        assert_eq!(parsed["sample_name"], "Sample_1");
        assert!(template.parse("L01.fastq").is_err());

        let err = template
            .fill(&values(&[("run", TemplateValue::from("L1")), ("sample_name", TemplateValue::from("s"))]))
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_repeated_field_must_match() {
        let template = FileNameTemplate::compile("{sample_name}/{run}_{sample_name}.fq").unwrap();
        let parsed = template.parse("abc/r1_abc.fq").unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed["sample_name"], "abc");
        assert_eq!(parsed["run"], "r1");

        let err = template.parse("abc/r1_abd.fq").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Parse);

        let filled = template
            .fill(&values(&[("sample_name", TemplateValue::from("abc")), ("run", TemplateValue::from("r1"))]))
            .unwrap();
        assert_eq!(filled, vec!["abc/r1_abc.fq"]);
    }

    #[test]
    fn test_parse_tolerates_trailing_text() {
        let template = FileNameTemplate::compile("{sample_name}_{orientation}.fastq").unwrap();
        let parsed = template.parse("s1_R.fastq.gz").unwrap();
        assert_eq!(parsed["sample_name"], "s1");
        assert_eq!(parsed["orientation"], "R");
    }

    #[test]
    fn test_parse_mismatch() {
        let template = FileNameTemplate::compile("{sample_name}_{orientation}.fastq").unwrap();
        let err = template.parse("s1.fq").unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Parse);
    }

    #[rstest]
    #[case("")]
    #[case("{}.fastq")]
    #[case("{name:abc}.fastq")]
    #[case("{na-me}.fastq")]
    #[case("{name.attr}.fastq")]
    #[case("{name.fastq")]
    #[case("name}.fastq")]
    fn test_compile_invalid(#[case] template: &str) {
        let err = FileNameTemplate::compile(template).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_fill_unresolved() {
        let template = FileNameTemplate::compile("{sample_name}_{run}.fastq").unwrap();
        let err = template.fill(&values(&[("sample_name", TemplateValue::from("s"))])).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err = template.fill(&TemplateValues::new()).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);

        let err =
            template.fill(&values(&[("orientation", TemplateValue::Multiple(vec![]))])).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }
}
