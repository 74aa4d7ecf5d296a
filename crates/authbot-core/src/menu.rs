//! The signed-in menu.
//!
//! Offered after every successful dialog entry. Accepts `Account` or
//! `Logout` by name (any case) or by number.

/// Invalid answers tolerated before the menu gives up.
pub const MAX_MENU_RETRIES: u32 = 3;

pub const MENU_PROMPT: &str = "What would you like to do?\n1. Account\n2. Logout";
pub const INVALID_CHOICE: &str = "Not a valid option";
pub const TOO_MANY_ATTEMPTS: &str =
    "Ooops! Too many attempts. Don't worry, just send me a message to try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Account,
    Logout,
}

impl MenuChoice {
    pub const ALL: [MenuChoice; 2] = [MenuChoice::Account, MenuChoice::Logout];

    pub fn label(self) -> &'static str {
        match self {
            Self::Account => "Account",
            Self::Logout => "Logout",
        }
    }

    /// Parse a user's answer to [`MENU_PROMPT`].
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        Self::ALL.into_iter().enumerate().find_map(|(i, choice)| {
            let number = (i + 1).to_string();
            (input.eq_ignore_ascii_case(choice.label()) || input == number).then_some(choice)
        })
    }
}

/// What the menu decided about one answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuOutcome {
    Chosen(MenuChoice),
    /// Ask again; carries the updated retry count.
    Retry(u32),
    GiveUp,
}

/// Classify `input` given how many retries were already used.
pub fn answer(input: &str, retries: u32) -> MenuOutcome {
    match MenuChoice::parse(input) {
        Some(choice) => MenuOutcome::Chosen(choice),
        None if retries >= MAX_MENU_RETRIES => MenuOutcome::GiveUp,
        None => MenuOutcome::Retry(retries + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_labels_and_numbers() {
        assert_eq!(MenuChoice::parse("account"), Some(MenuChoice::Account));
        assert_eq!(MenuChoice::parse(" LOGOUT "), Some(MenuChoice::Logout));
        assert_eq!(MenuChoice::parse("1"), Some(MenuChoice::Account));
        assert_eq!(MenuChoice::parse("2"), Some(MenuChoice::Logout));
        assert_eq!(MenuChoice::parse("3"), None);
        assert_eq!(MenuChoice::parse("find"), None);
    }

    #[test]
    fn three_retries_then_give_up() {
        let mut retries = 0;
        for expected in 1..=MAX_MENU_RETRIES {
            assert_eq!(answer("nope", retries), MenuOutcome::Retry(expected));
            retries = expected;
        }
        assert_eq!(answer("nope", retries), MenuOutcome::GiveUp);
    }

    #[test]
    fn valid_choice_after_retries_is_accepted() {
        assert_eq!(answer("2", 3), MenuOutcome::Chosen(MenuChoice::Logout));
    }
}
