use super::*;

mod test_helpers {
    use super::*;

    pub(super) fn parse_args(argv: &[&str]) -> Args {
        Args::try_parse_from(argv)
            .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
    }

    pub(super) fn assert_parse_fails(argv: &[&str]) {
        assert!(
            Args::try_parse_from(argv).is_err(),
            "argv={argv:?} should be rejected"
        );
    }
}

use test_helpers::{assert_parse_fails, parse_args};

#[test]
fn no_subcommand_means_interactive_chat() {
    let args = parse_args(&["kbchat"]);
    assert!(args.command.is_none());
    assert!(args.base_url.is_none());
    assert!(args.kb.is_none());
    assert!(args.log.is_none());
}

#[test]
fn global_flags_work_before_and_after_subcommand() {
    let before = parse_args(&[
        "kbchat",
        "--base-url",
        "http://kb.local:9000",
        "--kb",
        "kb-1",
        "chat",
    ]);
    assert_eq!(before.base_url.as_deref(), Some("http://kb.local:9000"));
    assert_eq!(before.kb.as_deref(), Some("kb-1"));
    assert!(matches!(before.command, Some(Commands::Chat)));

    let after = parse_args(&["kbchat", "say", "-l", "chat.md", "hello"]);
    assert_eq!(after.log, Some(PathBuf::from("chat.md")));
    match after.command {
        Some(Commands::Say { prompt }) => assert_eq!(prompt, vec!["hello"]),
        _ => panic!("expected say subcommand"),
    }
}

#[test]
fn say_collects_trailing_words() {
    let args = parse_args(&["kbchat", "say", "what", "is", "-x", "?"]);
    match args.command {
        Some(Commands::Say { prompt }) => assert_eq!(prompt.join(" "), "what is -x ?"),
        _ => panic!("expected say subcommand"),
    }
}

#[test]
fn list_defaults_to_first_page() {
    match parse_args(&["kbchat", "list"]).command {
        Some(Commands::List { page }) => assert_eq!(page, 1),
        _ => panic!("expected list subcommand"),
    }
    match parse_args(&["kbchat", "list", "--page", "3"]).command {
        Some(Commands::List { page }) => assert_eq!(page, 3),
        _ => panic!("expected list subcommand"),
    }
}

#[test]
fn conversation_commands_take_a_reference() {
    match parse_args(&["kbchat", "resume", "2"]).command {
        Some(Commands::Resume { chat }) => assert_eq!(chat, "2"),
        _ => panic!("expected resume subcommand"),
    }
    match parse_args(&["kbchat", "rename", "c1", "Quarterly", "notes"]).command {
        Some(Commands::Rename { chat, title }) => {
            assert_eq!(chat, "c1");
            assert_eq!(title.join(" "), "Quarterly notes");
        }
        _ => panic!("expected rename subcommand"),
    }
    match parse_args(&["kbchat", "delete", "c1"]).command {
        Some(Commands::Delete { chat }) => assert_eq!(chat, "c1"),
        _ => panic!("expected delete subcommand"),
    }

    assert_parse_fails(&["kbchat", "resume"]);
    assert_parse_fails(&["kbchat", "rename", "c1"]);
}

#[test]
fn set_without_value_shows_configuration() {
    match parse_args(&["kbchat", "set"]).command {
        Some(Commands::Set { key, value }) => {
            assert!(key.is_none());
            assert!(value.is_none());
        }
        _ => panic!("expected set subcommand"),
    }
    match parse_args(&["kbchat", "set", "reply-mode", "complete"]).command {
        Some(Commands::Set { key, value }) => {
            assert_eq!(key.as_deref(), Some("reply-mode"));
            assert_eq!(value, Some(vec!["complete".to_string()]));
        }
        _ => panic!("expected set subcommand"),
    }
    match parse_args(&["kbchat", "unset", "default-kb"]).command {
        Some(Commands::Unset { key }) => assert_eq!(key, "default-kb"),
        _ => panic!("expected unset subcommand"),
    }
}

#[test]
fn login_requires_identifier() {
    match parse_args(&["kbchat", "login", "ada@example.com"]).command {
        Some(Commands::Login { identifier }) => assert_eq!(identifier, "ada@example.com"),
        _ => panic!("expected login subcommand"),
    }
    assert_parse_fails(&["kbchat", "login"]);
    assert!(matches!(
        parse_args(&["kbchat", "logout"]).command,
        Some(Commands::Logout)
    ));
}
