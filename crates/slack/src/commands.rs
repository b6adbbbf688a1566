use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Normalised name: no leading `/`, ASCII lowercase. Empty when the body carried none.
    pub name: String,
    /// Free text after the command, exactly as sent (may be empty).
    pub argument: String,
    pub user_id: String,
    pub channel_id: String,
    pub response_url: Option<String>,
    pub trigger_id: Option<String>,
}

impl ParsedCommand {
    /// Fills in the name from the route when the body did not carry one.
    pub fn or_route_name(mut self, route_command: Option<&str>) -> Self {
        if self.name.is_empty() {
            if let Some(route_command) = route_command {
                self.name = normalize_command_name(route_command);
            }
        }
        self
    }

    pub fn has_argument(&self) -> bool {
        !self.argument.trim().is_empty()
    }

    pub fn display_name(&self) -> String {
        format!("/{}", self.name)
    }
}

/// Decodes an `application/x-www-form-urlencoded` slash command body.
pub fn parse(raw_body: &[u8]) -> ParsedCommand {
    let mut fields: HashMap<String, String> = HashMap::new();
    for (key, value) in form_urlencoded::parse(raw_body) {
        fields.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }

    let mut take = |key: &str| fields.remove(key);
    ParsedCommand {
        name: take("command").map(|command| normalize_command_name(&command)).unwrap_or_default(),
        argument: take("text").unwrap_or_default(),
        user_id: take("user_id").unwrap_or_default(),
        channel_id: take("channel_id").unwrap_or_default(),
        response_url: take("response_url").filter(|url| !url.is_empty()),
        trigger_id: take("trigger_id").filter(|id| !id.is_empty()),
    }
}

pub fn normalize_command_name(raw: &str) -> String {
    raw.trim().trim_start_matches('/').to_ascii_lowercase()
}

/// Strips angle brackets so user text cannot smuggle Slack mention or link markup.
pub fn sanitize_argument(text: &str) -> String {
    text.chars().filter(|ch| !matches!(ch, '<' | '>')).collect::<String>().trim().to_owned()
}

#[cfg(test)]
mod tests {
    use super::{normalize_command_name, parse, sanitize_argument};

    #[test]
    fn parses_standard_slash_command_fields() {
        let command = parse(
            b"token=abc&command=%2Fspecify&text=hello+world&user_id=U1&channel_id=C1\
              &response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2F1&trigger_id=T.1",
        );

        assert_eq!(command.name, "specify");
        assert_eq!(command.argument, "hello world");
        assert_eq!(command.user_id, "U1");
        assert_eq!(command.channel_id, "C1");
        assert_eq!(command.response_url.as_deref(), Some("https://hooks.slack.com/commands/1"));
        assert_eq!(command.trigger_id.as_deref(), Some("T.1"));
        assert_eq!(command.display_name(), "/specify");
    }

    #[test]
    fn missing_text_is_an_empty_argument() {
        let command = parse(b"command=/specify&user_id=U1&channel_id=C1");

        assert_eq!(command.argument, "");
        assert!(!command.has_argument());
        assert_eq!(command.response_url, None);
    }

    #[test]
    fn argument_is_not_trimmed_or_sanitized() {
        let command = parse(b"command=/specify&text=++%3C%40U123%3E+login++");
        assert_eq!(command.argument, "  <@U123> login  ");
        assert!(command.has_argument());
    }

    #[test]
    fn whitespace_only_argument_counts_as_missing() {
        let command = parse(b"command=/specify&text=+++");
        assert!(!command.has_argument());
    }

    #[test]
    fn route_name_fills_missing_command() {
        let from_route = parse(b"text=hello").or_route_name(Some("/Specify"));
        let from_body = parse(b"command=/help").or_route_name(Some("specify"));

        assert_eq!(from_route.name, "specify");
        assert_eq!(from_body.name, "help");
    }

    #[test]
    fn first_occurrence_of_a_field_wins() {
        let command = parse(b"text=first&text=second");
        assert_eq!(command.argument, "first");
    }

    #[test]
    fn command_names_are_normalized() {
        assert_eq!(normalize_command_name(" /SPECIFY "), "specify");
        assert_eq!(normalize_command_name("help"), "help");
    }

    #[test]
    fn sanitize_strips_angle_brackets() {
        assert_eq!(sanitize_argument(" <script>alert</script> "), "scriptalert/script");
        assert_eq!(sanitize_argument("<@U1> wants a spec"), "@U1 wants a spec");
    }
}
