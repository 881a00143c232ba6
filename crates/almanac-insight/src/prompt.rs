//! Summary prompt construction.

use almanac_core::types::{DetailLevel, SummaryConfig, SummarySection, Tone};

/// Marker opening the source content block of a summary prompt.
pub const CONTENT_START: &str = "<<<CONTENT";
/// Marker closing the source content block of a summary prompt.
pub const CONTENT_END: &str = "CONTENT>>>";

fn section_instruction(section: SummarySection) -> &'static str {
    match section {
        SummarySection::KeyPoints => "the main points discussed",
        SummarySection::Decisions => "decisions that were made",
        SummarySection::ActionItems => {
            "tasks to do, as objects {\"task\": ..., \"owner\": ..., \"deadline\": ...} when known"
        }
        SummarySection::Questions => "questions left open",
    }
}

fn tone_instruction(tone: Tone) -> &'static str {
    match tone {
        Tone::Professional => "Write in a professional, factual tone.",
        Tone::Neutral => "Write in a neutral tone.",
        Tone::Casual => "Write in a casual, friendly tone.",
    }
}

fn detail_instruction(level: DetailLevel) -> String {
    let style = match level {
        DetailLevel::Brief => "Be brief",
        DetailLevel::Standard => "Be concise",
        DetailLevel::Thorough => "Be thorough",
    };
    format!("{}: at most {} items per list.", style, level.max_items())
}

/// Build the generation prompt for summarizing `content` with `config`.
///
/// The reply is expected to be a single JSON object whose list keys are
/// the configured sections, plus `sentiment` and `participants`.
pub fn build_summary_prompt(content: &str, config: &SummaryConfig) -> String {
    let mut prompt = String::from(
        "You summarize documents and meeting transcripts. \
         Answer with one JSON object and nothing else.\n\n",
    );

    prompt.push_str("Fill these keys, each with a list of short strings:\n");
    for section in config.sections() {
        prompt.push_str(&format!(
            "- \"{}\": {}\n",
            section.json_key(),
            section_instruction(*section)
        ));
    }
    prompt.push_str("- \"participants\": names of the people involved\n");
    prompt.push_str(
        "Also set \"sentiment\" to one of \"positive\", \"neutral\", \"negative\" or \"mixed\".\n\n",
    );

    prompt.push_str(tone_instruction(config.tone()));
    prompt.push(' ');
    prompt.push_str(&detail_instruction(config.detail_level()));
    prompt.push_str(" Use an empty list when nothing applies; never invent content.\n");

    if let Some(extra) = config.custom_instructions() {
        prompt.push_str("\nAdditional instructions:\n");
        prompt.push_str(extra);
        prompt.push('\n');
    }

    prompt.push('\n');
    prompt.push_str(CONTENT_START);
    prompt.push('\n');
    prompt.push_str(content.trim());
    prompt.push('\n');
    prompt.push_str(CONTENT_END);
    prompt.push('\n');
    prompt
}
