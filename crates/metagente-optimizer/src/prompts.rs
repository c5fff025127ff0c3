//! Fixed role instructions and the review payload templates.
//!
//! Every model call sends an instruction as the system message and a payload
//! as the user message. Templates use `$name` placeholders filled by
//! [`render`].

/// Condenses a README down to its introduction and description.
pub const EXTRACTOR_INSTRUCTION: &str = "\
Your task is to shorten and extract only the introduction and description information from the README of a GitHub repository. The README text is given as the user message.

# Steps
- **Identify the structure of the repository**: The README file is a structured text file that might contain many sections such as introduction, description, installation, contributing, license,...
- **Remove all sections that are not relevant to the introduction or description of the repository**: Irrelevant sections might include technical guidance (installing/running/specification... instructions), repository structure/table of contents, contributions/references,...
- **Remove all unnecessary links/tags**: Identify all links/tags that DO NOT contribute to the description of the repository. You must remove all of these reference links and tags.
- **Return only text that is relevant to the description of the repository**: The output should only contain the text that is relevant to the introduction/description of the repository, including the project name/title, project tagline/functional description/purpose statement/overview. DO NOT include any output identifications such as: \"Here's the ...\" or \"Extracted README:\"";

/// Seed instruction for the Summarizer.
pub const INITIAL_SUMMARIZER_INSTRUCTION: &str = "\
Summarize the following extracted text from a GitHub repository README into a short term/phrase introducing the repository.

The output should include only a short term/phrase introducing the repository.";

/// A summarizer instruction produced by an earlier optimization run. Used by
/// `evaluate` when no instruction file is given.
pub const OPTIMIZED_SUMMARIZER_INSTRUCTION: &str = "\
Summarize the following extracted text from a GitHub repository README into a concise term or phrase introducing the repository. If a tagline, functional description, purpose statement, or overview is present at the beginning of the text, prioritize using it verbatim as the description. Ensure the output captures the key concept or idea of the repository, reflecting any specific terms or distinctive elements present in the extracted text. The output should include only a short term or phrase introducing the repository.";

/// System message for the Teacher.
pub const TEACHER_INSTRUCTION: &str = "\
You are a professional Prompt Engineer. You are working on a system using a Large Language Model (LLM) to help developers automatically generate a short description term/phrase containing the key concept/idea from an extracted text of the README of a GitHub repository. Your task is to modify and improve the current prompt of the LLM based on the result of testing on data that includes a README and a ground truth description.";

/// Teacher payload. Placeholders: `extracted_text`, `description`,
/// `generated_about`, `rouge_score`, `summarizer_prompt`.
pub const TEACHER_REVIEW_TEMPLATE: &str = "\
# Steps:
- **Analyze the data for testing**: Analyze the following data, which includes an extracted text from a README and a ground truth description from a GitHub repository:
<EXTRACTED_TEXT>
$extracted_text
</EXTRACTED_TEXT>

<GROUND_TRUTH_DESCRIPTION>
$description
</GROUND_TRUTH_DESCRIPTION>
- **Review the current result**: Review the description generated from the extracted text and its ROUGE score against the ground truth description to identify improvements that could be made:
<GENERATED_DESCRIPTION>
$generated_about
</GENERATED_DESCRIPTION>
<ROUGE_SCORE>
$rouge_score
</ROUGE_SCORE>
- **Prioritize extracting an existing tagline/functional description/purpose statement/overview**: Compare the beginning of the extracted text with the ground truth description. If the ground truth description already exists in the extracted text as a tagline/functional description/purpose statement/overview, the new prompt must instruct the LLM to prioritize using it.
- **Modify the current prompt**: Identify mistakes and missing instructions in the current prompt from the review above. Preserve the current prompt as much as possible and only make small changes based on the identified mistakes and missing instructions.
<CURRENT_PROMPT>
$summarizer_prompt
</CURRENT_PROMPT>
As the new prompt will not include the ground truth description, DO NOT mention the ground truth description in the new prompt. DO NOT include any reasoning/explanation like \"Based on the result of the above review:\", \"Here's the\", ... or any output identifiers like \"Prompt:\", \"New Prompt\", ... The output should only include a string representing the new prompt for the LLM.";

/// System message for the Combiner.
pub const COMBINER_INSTRUCTION: &str = "\
You are a professional Prompt Engineer. You are working on a system using a Large Language Model (LLM) to help developers automatically generate a short description term/phrase containing the key concept/idea from an extracted text of the README of a GitHub repository. Your task is to combine several candidate prompts for the LLM into a final prompt.";

/// Combiner payload. Placeholder: `summarizer_list`.
pub const COMBINE_TEMPLATE: &str = "\
# Steps:
- **Review all candidate prompts**: Analyze the following prompts to identify common parts to be included in the final prompt, and also include specific details or conditional key points from these prompts in the final prompt.
<CANDIDATE_PROMPTS>
$summarizer_list
</CANDIDATE_PROMPTS>
- **Generate a final prompt**: Based on the common parts and conditional key points, generate a final prompt for the LLM.

# Output Format:
Do not include any reasoning/explanation like \"Based on the result of the above review:\", \"Here's the\", ... or any output identifiers like \"Prompt:\", \"New Prompt\", ... The output should only include a string representing the prompt for the LLM.";

/// Labels models like to put in front of a rewritten prompt.
const WRAPPER_LABELS: [&str; 5] = [
    "new prompt:",
    "final prompt:",
    "improved prompt:",
    "updated prompt:",
    "prompt:",
];

// ─────────────────────────────────────────────────────────────────────────────
// Rendering
// ─────────────────────────────────────────────────────────────────────────────

/// Substitute `$name` placeholders.
///
/// Names are runs of ASCII alphanumerics and underscores. Unknown names are
/// left as written, and substituted values are never rescanned.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let name = &after[..name_len];

        match vars.iter().find(|(key, _)| *key == name) {
            Some((_, value)) if !name.is_empty() => out.push_str(value),
            _ => {
                out.push('$');
                out.push_str(name);
            }
        }
        rest = &after[name_len..];
    }

    out.push_str(rest);
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Cleaning
// ─────────────────────────────────────────────────────────────────────────────

/// Strip code fences, wrapper labels and surrounding quotes from a model
/// reply that should be a bare instruction.
pub fn clean_candidate(text: &str) -> String {
    let mut s = strip_fences(text.trim()).trim();

    loop {
        let lower = s.to_lowercase();
        let Some(label) = WRAPPER_LABELS.iter().find(|l| lower.starts_with(*l)) else {
            break;
        };
        s = s[label.len()..].trim_start();
    }

    let s = s.trim();
    let unquoted = s
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .filter(|inner| !inner.contains('"'))
        .unwrap_or(s);
    unquoted.trim().to_string()
}

fn strip_fences(text: &str) -> &str {
    let Some(body) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an optional language tag on the opening fence line
    let body = match body.find('\n') {
        Some(nl) if !body[..nl].trim().contains(' ') => &body[nl + 1..],
        _ => body,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body)
}

/// Clean a winner list: trim each entry and drop empties. Repeated entries
/// are kept, one per winning example, in order.
pub fn clean_prompt_list<S: AsRef<str>>(prompts: &[S]) -> Vec<String> {
    prompts
        .iter()
        .map(|p| p.as_ref().trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Format a list as `1. first`, `2. second`, one per line.
pub fn number_prompts<S: AsRef<str>>(prompts: &[S]) -> String {
    prompts
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. {}", i + 1, p.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
