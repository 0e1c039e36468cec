use bitflags::bitflags;

bitflags! {
    /// IRCv3 capabilities a client has negotiated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Caps: u32 {
        /// `message-tags`: the client accepts `@tag` sections on inbound lines.
        const MESSAGE_TAGS = 1 << 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_empty() {
        assert!(!Caps::default().contains(Caps::MESSAGE_TAGS));
    }
}
