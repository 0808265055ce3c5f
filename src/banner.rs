pub const HELP: &str = r#"------------------------------------------------
Type a line to talk to everyone
`/msg <user> <text>`  whisper to one user
`/list`               who else is here
`/logout`             leave the chat
------------------------------------------------"#;

pub fn welcome(name: &str) -> String {
    format!("Welcome to the chat, {name}!\n{HELP}")
}
