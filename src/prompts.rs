//! Prompts for report generation.
//!
//! Every prompt is built here from the active [`TemplateProfile`], so adding a
//! document type or changing a section's guidance is a profile change, not a
//! code change. Unit tests inspect the prompts directly without a backend.
//!
//! The output rules ask for a bare JSON object. The model will not always
//! comply; [`crate::pipeline::repair`] deals with what comes back.

use crate::profile::{DocumentTemplate, TemplateProfile};
use std::collections::BTreeMap;
use std::fmt::Write as _;

const SYSTEM_PREAMBLE: &str = "You are an expert in creating formal academic and professional reports.
Generate a COMPREHENSIVE and DETAILED report for the requested event type, using the section structure listed for it below. All content describes a completed event and is written in the past tense.";

const OUTPUT_RULES: &str = "ENSURE THE REPORT IS FORMAL, PROFESSIONAL, AND EXCEEDS 300 WORDS WHERE NECESSARY.
PROVIDE ELABORATE DESCRIPTIONS, SPECIFIC DETAILS, AND CONTEXTUAL INFORMATION.
WRITE IN THE PAST TENSE.
Return ONLY the raw JSON object: no markdown, no code fences, no commentary outside it.
Ensure all JSON syntax is correct: double quotes, commas between members, balanced braces.";

const USER_REQUIREMENTS: &[&str] = &[
    "Format the response as a JSON object with sections as specified in the system prompt",
    "ONLY return the JSON object, with NO explanation or markdown formatting around it",
    "Use formal academic language",
    "Include specific details from the provided information",
    "THE TOTAL DOCUMENT SHOULD BE AT LEAST 300-350 WORDS",
    "Develop each section with relevant details and context",
];

/// The `{"sections": {title: guidance}}` skeleton for one template.
pub fn section_skeleton(template: &DocumentTemplate) -> String {
    let sections: serde_json::Map<String, serde_json::Value> = template
        .sections
        .iter()
        .map(|s| (s.title.clone(), serde_json::Value::String(s.guidance.clone())))
        .collect();
    serde_json::to_string_pretty(&serde_json::json!({ "sections": sections }))
        .unwrap_or_default()
}

/// System prompt listing every document template in the profile.
pub fn system_prompt(profile: &TemplateProfile) -> String {
    let mut prompt = String::from(SYSTEM_PREAMBLE);
    prompt.push_str("\n\n");
    for template in &profile.document_templates {
        let _ = writeln!(prompt, "- '{}':\n{}\n", template.label, section_skeleton(template));
    }
    prompt.push_str(OUTPUT_RULES);
    prompt
}

/// User prompt: the request fields as `# key:\nvalue` blocks plus requirements.
pub fn user_prompt(template: &DocumentTemplate, fields: &BTreeMap<String, String>) -> String {
    // Required fields first, in template order; extras after.
    let mut ordered: Vec<(&str, &str)> = template
        .required_fields
        .iter()
        .filter_map(|k| fields.get(k).map(|v| (k.as_str(), v.as_str())))
        .collect();
    ordered.extend(
        fields
            .iter()
            .filter(|(k, _)| !template.required_fields.contains(k))
            .map(|(k, v)| (k.as_str(), v.as_str())),
    );

    let mut prompt = format!(
        "Please generate a DETAILED {} using these details:\n\n",
        template.label.to_lowercase()
    );
    for (key, value) in ordered {
        let _ = writeln!(prompt, "# {key}:\n{value}\n");
    }
    prompt.push_str("IMPORTANT REQUIREMENTS:\n");
    for req in USER_REQUIREMENTS {
        let _ = writeln!(prompt, "- {req}");
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_lists_template_sections_in_order() {
        let profile = TemplateProfile::default();
        let prompt = system_prompt(&profile);
        assert!(prompt.contains("'Guest Lecture Report'"));
        let summary = prompt.find("\"Event Summary\"").unwrap();
        let acks = prompt.find("\"Acknowledgments\"").unwrap();
        assert!(summary < acks);
        assert!(prompt.contains("past tense"));
    }

    #[test]
    fn user_prompt_renders_fields_as_blocks() {
        let profile = TemplateProfile::default();
        let template = profile.template("GuestLecture").unwrap();
        let mut fields = BTreeMap::new();
        fields.insert("Topic".to_string(), "Robotics".to_string());
        fields.insert("Guest Name".to_string(), "Dr. A".to_string());
        fields.insert("Venue".to_string(), "Hall 2".to_string());
        let prompt = user_prompt(template, &fields);
        assert!(prompt.contains("# Topic:\nRobotics\n"));
        // template order: Guest Name precedes Topic; extras come last
        let guest = prompt.find("# Guest Name:").unwrap();
        let topic = prompt.find("# Topic:").unwrap();
        let venue = prompt.find("# Venue:").unwrap();
        assert!(guest < topic && topic < venue);
        assert!(prompt.contains("IMPORTANT REQUIREMENTS:"));
    }

    #[test]
    fn skeleton_is_valid_json() {
        let profile = TemplateProfile::default();
        let skeleton = section_skeleton(&profile.document_templates[0]);
        let value: serde_json::Value = serde_json::from_str(&skeleton).unwrap();
        assert_eq!(value["sections"].as_object().unwrap().len(), 8);
    }
}
