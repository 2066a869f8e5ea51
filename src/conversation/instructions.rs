use crate::content::{Catalog, SegmentId};
use crate::conversation::protocol::ToolDefinition;

/// First word of the listener's name, or a neutral greeting
pub fn first_name(name: Option<&str>) -> String {
    name.and_then(|n| n.split_whitespace().next())
        .map(str::to_string)
        .unwrap_or_else(|| "there".to_string())
}

/// Compose the companion's instructions
///
/// `current` is the section in view when the session starts; the first
/// section is assumed when it is unknown.
pub fn build_instructions(
    persona: &str,
    listener: Option<&str>,
    current: Option<&SegmentId>,
    catalog: &Catalog,
    tools: &[ToolDefinition],
) -> String {
    let name = first_name(listener);
    let section = current
        .and_then(|id| catalog.get(id))
        .or_else(|| catalog.sections().first());

    let mut out = String::new();
    out.push_str(persona.trim());
    out.push_str("\n\n## Your Role\n\n");
    out.push_str(&format!(
        "You're here to talk with {} about the article below. Ask open questions and \
         listen more than you speak. Keep your answers short.\n",
        name
    ));
    if let Some(section) = section {
        out.push_str(&format!(
            "\n{} is viewing the section: \"{}\"\n",
            name, section.title
        ));
    }

    if !tools.is_empty() {
        out.push_str("\n## Your Tools\n\n");
        for tool in tools {
            out.push_str(&format!("- **{}**: {}\n", tool.name, tool.description));
        }
        out.push_str(
            "\nUse them when the conversation turns to a particular part of the article.\n",
        );
    }

    out.push_str("\n## Starting the Conversation\n\n");
    out.push_str(&format!(
        "Greet {} warmly by name, mention the section they are on, and ask what caught \
         their attention.\n",
        name
    ));

    if !catalog.is_empty() {
        out.push_str("\n---\n\n## Full Article Content (for your reference)\n\n");
        out.push_str(&catalog.to_markdown());
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Section;

    fn catalog() -> Catalog {
        Catalog::from_sections(vec![
            Section::new("intro", "The Truth", "Opening words.").with_subtitle("Why"),
            Section::new("latency", "Decision latency", "Slow answers."),
        ])
        .unwrap()
    }

    #[test]
    fn test_first_name() {
        assert_eq!(first_name(Some("Ada Lovelace")), "Ada");
        assert_eq!(first_name(Some("   ")), "there");
        assert_eq!(first_name(None), "there");
    }

    #[test]
    fn test_current_section_defaults_to_first() {
        let text = build_instructions("Persona.", Some("Ada King"), None, &catalog(), &[]);
        assert!(text.starts_with("Persona."));
        assert!(text.contains("Ada is viewing the section: \"The Truth\""));
        assert!(!text.contains("## Your Tools"));
    }

    #[test]
    fn test_includes_tools_and_article() {
        let tools = vec![ToolDefinition {
            kind: "function".into(),
            name: "read_section".into(),
            description: "Read a section.".into(),
            parameters: serde_json::json!({}),
        }];
        let current = SegmentId::from("latency");
        let text = build_instructions("P", None, Some(&current), &catalog(), &tools);
        assert!(text.contains("there is viewing the section: \"Decision latency\""));
        assert!(text.contains("- **read_section**: Read a section."));
        assert!(text.contains("## Full Article Content (for your reference)"));
        assert!(text.contains("## The Truth\n*Why*\nOpening words.\n\n---\n\n## Decision latency"));
    }
}
