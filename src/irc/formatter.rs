use super::numerics::*;
use super::parser::{CMD_PONG, CMD_PRIVMSG, IrcMessage};

// Helpers to build IRC reply messages. `server` is the gateway name taken
// from the state store; `nick` is the reply target ("*" before a nickname
// is accepted).

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Registration errors a handler can report, keyed by what went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReply {
    NeedMoreParams,
    NoNicknameGiven,
    PasswdMismatch,
    NickCollision,
    NicknameInUse,
}

/// Look up the wire reply for `err`, using `msg` (the offending command)
/// for the command name or requested nickname.
pub fn error_reply(server: &str, nick: &str, err: ErrorReply, msg: &IrcMessage) -> IrcMessage {
    let wanted = msg.params.first().map(String::as_str).unwrap_or("*");
    match err {
        ErrorReply::NeedMoreParams => err_needmoreparams(server, nick, &msg.command),
        ErrorReply::NoNicknameGiven => err_nonicknamegiven(server, nick),
        ErrorReply::PasswdMismatch => err_passwdmismatch(server, nick),
        ErrorReply::NickCollision => err_nickcollision(server, nick, wanted),
        ErrorReply::NicknameInUse => err_nicknameinuse(server, nick, wanted),
    }
}

/// The post-registration burst: 001-004 and the missing-MOTD notice.
pub fn intro(server: &str, nick: &str) -> Vec<IrcMessage> {
    vec![
        rpl_welcome(server, nick),
        rpl_yourhost(server, nick),
        rpl_created(server, nick),
        rpl_myinfo(server, nick),
        err_nomotd(server, nick),
    ]
}

/// :channels 001 nick :Welcome to Channels, nick!
pub fn rpl_welcome(server: &str, nick: &str) -> IrcMessage {
    IrcMessage::server_reply(server, RPL_WELCOME, vec![nick.into()])
        .with_trailing(format!("Welcome to Channels, {}!", nick))
}

/// :channels 002 nick :Your host is channels, running version 0.1.0
pub fn rpl_yourhost(server: &str, nick: &str) -> IrcMessage {
    IrcMessage::server_reply(server, RPL_YOURHOST, vec![nick.into()]).with_trailing(format!(
        "Your host is {}, running version {}",
        server, VERSION
    ))
}

/// :channels 003 nick :This server was created ...
pub fn rpl_created(server: &str, nick: &str) -> IrcMessage {
    IrcMessage::server_reply(server, RPL_CREATED, vec![nick.into()])
        .with_trailing("This server was created today")
}

/// :channels 004 nick channels 0.1.0 o o
pub fn rpl_myinfo(server: &str, nick: &str) -> IrcMessage {
    IrcMessage::server_reply(
        server,
        RPL_MYINFO,
        vec![
            nick.into(),
            server.into(),
            VERSION.into(),
            "o".into(),
            "o".into(),
        ],
    )
}

/// :channels 422 nick :MOTD File is missing
pub fn err_nomotd(server: &str, nick: &str) -> IrcMessage {
    IrcMessage::server_reply(server, ERR_NOMOTD, vec![nick.into()])
        .with_trailing("MOTD File is missing")
}

/// :from!from@channels PRIVMSG target :message
pub fn privmsg(server: &str, from: &str, target: &str, message: &str) -> IrcMessage {
    IrcMessage::new(CMD_PRIVMSG)
        .with_prefix(format!("{}!{}@{}", from, from, server))
        .with_params([target])
        .with_trailing(message)
}

/// :channels PONG channels :token
pub fn pong(server: &str, token: &str) -> IrcMessage {
    IrcMessage::server_reply(server, CMD_PONG, vec![server.into()]).with_trailing(token)
}

// Error replies

/// :channels 401 nick target :No such nick/channel
pub fn err_nosuchnick(server: &str, nick: &str, target: &str) -> IrcMessage {
    IrcMessage::server_reply(server, ERR_NOSUCHNICK, vec![nick.into(), target.into()])
        .with_trailing("No such nick/channel")
}

/// :channels 421 nick command :Unknown command
pub fn err_unknowncommand(server: &str, nick: &str, command: &str) -> IrcMessage {
    IrcMessage::server_reply(server, ERR_UNKNOWNCOMMAND, vec![nick.into(), command.into()])
        .with_trailing("Unknown command")
}

/// :channels 431 nick :No nickname given
pub fn err_nonicknamegiven(server: &str, nick: &str) -> IrcMessage {
    IrcMessage::server_reply(server, ERR_NONICKNAMEGIVEN, vec![nick.into()])
        .with_trailing("No nickname given")
}

/// :channels 433 nick newnick :Nickname is already in use
pub fn err_nicknameinuse(server: &str, nick: &str, wanted: &str) -> IrcMessage {
    IrcMessage::server_reply(server, ERR_NICKNAMEINUSE, vec![nick.into(), wanted.into()])
        .with_trailing("Nickname is already in use")
}

/// :channels 436 nick newnick :Nickname collision KILL
pub fn err_nickcollision(server: &str, nick: &str, wanted: &str) -> IrcMessage {
    IrcMessage::server_reply(server, ERR_NICKCOLLISION, vec![nick.into(), wanted.into()])
        .with_trailing("Nickname collision KILL")
}

/// :channels 461 nick command :Not enough parameters
pub fn err_needmoreparams(server: &str, nick: &str, command: &str) -> IrcMessage {
    IrcMessage::server_reply(server, ERR_NEEDMOREPARAMS, vec![nick.into(), command.into()])
        .with_trailing("Not enough parameters")
}

/// :channels 462 nick :You may not reregister
pub fn err_alreadyregistered(server: &str, nick: &str) -> IrcMessage {
    IrcMessage::server_reply(server, ERR_ALREADYREGISTERED, vec![nick.into()])
        .with_trailing("You may not reregister")
}

/// :channels 464 nick :Password incorrect
pub fn err_passwdmismatch(server: &str, nick: &str) -> IrcMessage {
    IrcMessage::server_reply(server, ERR_PASSWDMISMATCH, vec![nick.into()])
        .with_trailing("Password incorrect")
}
