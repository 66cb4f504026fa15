/// Quick actions offered on a text selection in the section editor.
///
/// Each one turns the selected text into a prompt for the writing assistant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssistAction {
    Edit,
    Summarize,
    Enhance,
}

impl AssistAction {
    pub const ALL: [AssistAction; 3] = [Self::Edit, Self::Summarize, Self::Enhance];

    pub fn verb(self) -> &'static str {
        match self {
            Self::Edit => "Edit",
            Self::Summarize => "Summarize",
            Self::Enhance => "Enhance",
        }
    }

    /// Prompt for `selection`, or `None` when nothing is selected.
    pub fn prompt(self, selection: &str) -> Option<String> {
        let selection = selection.trim();
        if selection.is_empty() {
            return None;
        }
        Some(format!("{} this text: \"{selection}\"", self.verb()))
    }
}

#[cfg(test)]
mod tests {
    use super::AssistAction;

    #[test]
    fn prompt_quotes_the_selection() {
        assert_eq!(
            AssistAction::Summarize.prompt("The cat sat."),
            Some("Summarize this text: \"The cat sat.\"".to_string())
        );
    }

    #[test]
    fn blank_selection_yields_no_prompt() {
        for action in AssistAction::ALL {
            assert_eq!(action.prompt("  \n"), None);
        }
    }
}
