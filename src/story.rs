use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryConcept {
    pub concept_id: u32,
    pub title: String,
    pub job: String,
    pub workplace: String,
    pub horror_element: String,
    pub unique_hook: String,
    #[serde(default)]
    pub character_details: String,
    #[serde(default)]
    pub plot_outline: String,
    #[serde(default = "default_target_words")]
    pub target_words: u32,
    #[serde(default = "default_estimated_minutes")]
    pub estimated_minutes: String,
}

fn default_target_words() -> u32 {
    1400
}

fn default_estimated_minutes() -> String {
    "10-12".to_string()
}

impl StoryConcept {
    /// Upper bound of `estimated_minutes`: "10-12" -> 12, "11" -> 11.
    pub fn estimated_minutes_upper(&self) -> u32 {
        let upper = self.estimated_minutes.rsplit('-').next().unwrap_or("");
        upper.trim().parse().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationTheme {
    pub compilation_theme: String,
    pub compilation_title: String,
    #[serde(default)]
    pub theme_description: String,
    pub story_concepts: Vec<StoryConcept>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub story_number: u32,
    pub concept: StoryConcept,
    pub generated_at: String,
    pub word_count: usize,
    pub content: String,
    pub model: String,
}

impl Story {
    pub fn file_name(&self) -> String {
        format!("story_{:02}_{}.md", self.story_number, title_slug(&self.concept.title))
    }

    pub fn to_markdown(&self) -> String {
        let c = &self.concept;
        let mut out = String::new();
        out.push_str(&format!("# Story {}: {}\n\n", self.story_number, c.title));
        out.push_str(&format!("**Concept**: {}\n", c.unique_hook));
        out.push_str(&format!("**Job**: {}\n", c.job));
        out.push_str(&format!("**Workplace**: {}\n", c.workplace));
        out.push_str(&format!("**Horror Element**: {}\n", c.horror_element));
        out.push_str(&format!("**Target Length**: {} minutes\n", c.estimated_minutes));
        out.push_str(&format!("**Word Count**: {} words\n", self.word_count));
        out.push_str(&format!("**Generated**: {}\n\n", self.generated_at));
        out.push_str("---\n\n");
        out.push_str(&self.content);
        out
    }
}

/// The evaluator's ranking output. Only the production recommendation is
/// acted upon.
#[derive(Debug, Clone, Deserialize)]
pub struct ConceptEvaluation {
    #[serde(default)]
    pub rankings: Vec<ConceptRanking>,
    pub production_recommendations: ProductionRecommendations,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConceptRanking {
    pub rank: u32,
    pub concept_id: u32,
    #[serde(default)]
    pub quality_score: f64,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductionRecommendations {
    pub top_concepts: Vec<u32>,
    #[serde(default)]
    pub suggested_order: Vec<u32>,
    #[serde(default)]
    pub pacing_notes: String,
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// File-name-safe form of a title: lowercase alphanumerics joined by `_`.
/// Path separators and other punctuation never reach the result.
pub fn title_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if ch.is_whitespace() || ch == '-' || ch == '_' {
            if !slug.is_empty() && !slug.ends_with('_') {
                slug.push('_');
            }
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("untitled");
    }
    slug
}

fn fenced_json_regex() -> Result<&'static Regex> {
    static FENCE_RE: OnceCell<Regex> = OnceCell::new();
    FENCE_RE.get_or_try_init(|| {
        Regex::new(r"(?s)```[\w-]*\s*(.*?)\s*```").context("failed to compile fence regex")
    })
}

fn brace_slice(text: &str) -> Option<&str> {
    match (text.find('{'), text.rfind('}')) {
        (Some(s), Some(e)) if e > s => Some(&text[s..=e]),
        _ => None,
    }
}

/// Parses a JSON payload out of a model reply, tolerating a markdown fence
/// (any info string) or chatter around the outermost braces.
pub fn parse_model_json<T: DeserializeOwned>(reply: &str) -> Result<T> {
    let trimmed = reply.trim();
    let fenced = fenced_json_regex()?
        .captures(trimmed)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str());
    let bare = brace_slice(trimmed).unwrap_or(trimmed);

    let parsed = match fenced {
        Some(body) => serde_json::from_str::<T>(body).or_else(|_| serde_json::from_str::<T>(bare)),
        None => serde_json::from_str::<T>(bare),
    };
    parsed.with_context(|| {
        let snippet: String = trimmed.chars().take(200).collect();
        format!("Failed to parse model JSON (starts: {})", snippet)
    })
}

const STORY_TEMPLATE: &str = r#"Create a first-person horror story of approximately [LENGTH] words that could be narrated in [TARGET_MINUTES] minutes.

REQUIREMENTS:
- Write in first person ("I" perspective)
- Frame as a "true story" the narrator experienced
- Set in a realistic, relatable location: workplace
- Include specific, authentic details that make it believable
- Build tension gradually through normal situations becoming wrong
- Use past tense narration
- End with lasting impact on narrator ("I still..." or "To this day...")
- Establish workplace/setting routine before introducing horror element
- Include multiple "lasting impact" reflections throughout the ending

SETTING PROMPT:
{setting_description}

WORKPLACE DETAIL REQUIREMENTS:
- Specific job procedures, equipment, or daily tasks
- Names of coworkers, supervisors, or regular customers (if applicable)
- Physical layout details of the workplace
- Normal schedule, break routines, or typical interactions

ENDING IMPACT REQUIREMENTS:
- Include 2-3 different "I still..." or "To this day..." statements
- Mention specific triggers that bring back memories
- Describe how the experience changed narrator's behavior or perspective
- End with an unsettling final thought or ongoing fear

TONE: Believable, personal account with authentic details. Should feel like it could really happen.

Generate the complete story now."#;

pub fn theme_prompt(concept_count: usize) -> String {
    format!(
        r#"Create a horror compilation theme with {count} story concepts.

Respond with JSON only, using this exact structure:
{{
  "compilation_theme": "Night shift workplace horror",
  "compilation_title": "{count} True Scary Night Shift Stories That Will Keep You Awake",
  "theme_description": "Stories about night shift workers encountering disturbing people",
  "story_concepts": [
    {{
      "concept_id": 1,
      "title": "The Cleaning Crew",
      "job": "night security guard",
      "workplace": "office building",
      "horror_element": "cleaning crew member with disturbing behavior",
      "unique_hook": "discovers what the cleaner does during breaks",
      "character_details": "new security guard, observant",
      "plot_outline": "Guard notices cleaner acting strangely. Investigates and discovers disturbing truth.",
      "target_words": 1400,
      "estimated_minutes": "10-12"
    }}
  ]
}}

Number concept_id values from 1 to {count}. Every concept needs a different job and workplace."#,
        count = concept_count
    )
}

pub fn evaluation_prompt(theme: &CompilationTheme) -> Result<String> {
    let concepts_json = serde_json::to_string_pretty(&theme.story_concepts)?;
    Ok(format!(
        r#"Evaluate and rank these horror story concepts for a YouTube compilation.

STORY CONCEPTS:
{concepts_json}

EVALUATION CRITERIA:
- Creativity and uniqueness of premise
- Believability and authenticity potential
- Horror effectiveness (tension, fear factor)
- Workplace setting authenticity
- Character development potential
- Narrative hook strength

TASKS:
1. Rank all concepts from best (1) to worst
2. Rate each concept 1-10 on overall quality
3. Identify the top 10 concepts for production
4. Explain ranking rationale

OUTPUT FORMAT (JSON only):
{{
  "rankings": [
    {{
      "rank": 1,
      "concept_id": 3,
      "title": "Story title",
      "quality_score": 9,
      "strengths": ["strength1", "strength2"],
      "selected_for_production": true,
      "rationale": "Why this concept ranks here"
    }}
  ],
  "production_recommendations": {{
    "top_concepts": [3, 1, 2],
    "suggested_order": [1, 3, 2],
    "pacing_notes": "Notes on compilation flow and pacing"
  }}
}}

Evaluate and rank all concepts now."#
    ))
}

pub fn story_prompt(concept: &StoryConcept) -> String {
    let setting = format!(
        "I worked as a {job} at {workplace}.\n\n\
         CHARACTER BACKGROUND: {character}\n\n\
         STORY CONCEPT: {plot}\n\n\
         UNIQUE ELEMENTS: {hook}\n\n\
         HORROR ELEMENT: {horror}\n\n\
         Develop this concept into a complete horror story with authentic workplace details, \
         gradual tension building, and a satisfying conclusion that leaves lasting psychological impact.",
        job = concept.job,
        workplace = concept.workplace,
        character = concept.character_details,
        plot = concept.plot_outline,
        hook = concept.unique_hook,
        horror = concept.horror_element,
    );

    STORY_TEMPLATE
        .replace("[LENGTH]", &concept.target_words.to_string())
        .replace("[TARGET_MINUTES]", &concept.estimated_minutes)
        .replace("{setting_description}", &setting)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn concept(id: u32, title: &str) -> StoryConcept {
        StoryConcept {
            concept_id: id,
            title: title.to_string(),
            job: "overnight stocker".to_string(),
            workplace: "big box store".to_string(),
            horror_element: "coworker with secret storage room activities".to_string(),
            unique_hook: "forbidden storage room".to_string(),
            character_details: "college student".to_string(),
            plot_outline: "New worker discovers coworker accessing restricted area.".to_string(),
            target_words: 1450,
            estimated_minutes: "10-12".to_string(),
        }
    }

    #[test]
    fn estimate_upper_bound() {
        let mut c = concept(1, "A");
        assert_eq!(c.estimated_minutes_upper(), 12);
        c.estimated_minutes = "11".to_string();
        assert_eq!(c.estimated_minutes_upper(), 11);
        c.estimated_minutes = "about ten".to_string();
        assert_eq!(c.estimated_minutes_upper(), 0);
    }

    #[test]
    fn slug_and_file_name() {
        assert_eq!(title_slug("Storage Room 12, Aisle B"), "storage_room_12_aisle_b");
        let story = Story {
            story_number: 3,
            concept: concept(3, "The Night Caller"),
            generated_at: "2025-01-01T00:00:00".to_string(),
            word_count: 2,
            content: "It began.".to_string(),
            model: "opus".to_string(),
        };
        assert_eq!(story.file_name(), "story_03_the_night_caller.md");
        let md = story.to_markdown();
        assert!(md.starts_with("# Story 3: The Night Caller\n\n"));
        assert!(md.contains("**Target Length**: 10-12 minutes\n"));
        assert!(md.ends_with("---\n\nIt began."));
    }

    #[derive(Deserialize)]
    struct Sample {
        a: u32,
    }

    #[test]
    fn parses_fenced_and_bare_json() {
        let fenced = "Here you go:\n```json\n{\"a\": 1}\n```\nEnjoy!";
        assert_eq!(parse_model_json::<Sample>(fenced).unwrap().a, 1);
        let chatty = "Sure! {\"a\": 2} hope that helps";
        assert_eq!(parse_model_json::<Sample>(chatty).unwrap().a, 2);
        assert!(parse_model_json::<Sample>("no json here").is_err());
    }

    #[test]
    fn fence_info_string_is_skipped() {
        let upper = "```JSON\n{\"a\": 1}\n```";
        assert_eq!(parse_model_json::<Sample>(upper).unwrap().a, 1);
        let bare_fence = "```\n{\"a\": 4}\n```";
        assert_eq!(parse_model_json::<Sample>(bare_fence).unwrap().a, 4);
    }

    #[test]
    fn unparsable_fence_falls_back_to_braces() {
        let reply = "```text\nThe theme follows: {\"a\": 3}\n```";
        assert_eq!(parse_model_json::<Sample>(reply).unwrap().a, 3);
    }

    #[test]
    fn slug_strips_path_separators() {
        assert_eq!(title_slug("The 24/7 Diner"), "the_247_diner");
        assert_eq!(title_slug(r"Back\Room: Part 2"), "backroom_part_2");
        assert_eq!(title_slug("Don't  Look - Up"), "dont_look_up");
        assert_eq!(title_slug("???"), "untitled");
    }

    #[test]
    fn story_prompt_fills_placeholders() {
        let p = story_prompt(&concept(1, "Storage Room 12"));
        assert!(p.contains("approximately 1450 words"));
        assert!(p.contains("narrated in 10-12 minutes"));
        assert!(p.contains("I worked as a overnight stocker at big box store."));
        assert!(!p.contains("{setting_description}"));
        assert!(!p.contains("[LENGTH]"));
    }

    #[test]
    fn concept_defaults_fill_missing_fields() {
        let c: StoryConcept = serde_json::from_str(
            r#"{"concept_id": 4, "title": "T", "job": "j", "workplace": "w", "horror_element": "h", "unique_hook": "u"}"#,
        )
        .unwrap();
        assert_eq!(c.target_words, 1400);
        assert_eq!(c.estimated_minutes, "10-12");
    }

    #[test]
    fn evaluation_parses_recommendations() {
        let eval: ConceptEvaluation = parse_model_json(
            r#"{"rankings":[{"rank":1,"concept_id":2,"quality_score":9,"rationale":"x"}],
                "production_recommendations":{"top_concepts":[2,1]}}"#,
        )
        .unwrap();
        assert_eq!(eval.production_recommendations.top_concepts, vec![2, 1]);
        assert_eq!(eval.rankings[0].rank, 1);
    }
}
