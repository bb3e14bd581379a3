//! Channel name derivation (base spec §3, §4.1).
//!
//! Pure string computation, performed once at adapter construction. The `#`
//! separators and the trailing `#` after a room name are significant and
//! must match byte-for-byte across implementations (base spec §6).

/// Derives the four channel names an adapter instance uses from a
/// `(prefix, nsp, serverId)` triple.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelNamer {
    broadcast_channel: String,
    request_channel: String,
    response_channel: String,
}

impl ChannelNamer {
    /// Build the namer for a given prefix, namespace and local server id.
    ///
    /// `prefix` should already have had the configured default (`"socket.io"`)
    /// applied; this type does not itself know about `AdapterConfig`.
    pub fn new(prefix: &str, nsp: &str) -> Self {
        Self {
            broadcast_channel: format!("{prefix}#{nsp}#"),
            request_channel: format!("{prefix}-request#{nsp}#"),
            response_channel: format!("{prefix}-response#{nsp}#"),
        }
    }

    /// `{prefix}#{nsp}#`, subscribed to with trailing `*` as a pattern.
    pub fn broadcast_channel(&self) -> &str {
        &self.broadcast_channel
    }

    /// The pattern used for the broadcast pattern-subscription.
    pub fn broadcast_pattern(&self) -> String {
        format!("{}*", self.broadcast_channel)
    }

    /// `{broadcastChannel}{room}#`, publish-only: matched by the pattern
    /// subscription above, never subscribed to directly.
    pub fn room_channel(&self, room: &str) -> String {
        format!("{}{room}#", self.broadcast_channel)
    }

    /// `{prefix}-request#{nsp}#`, exact subscribe.
    pub fn request_channel(&self) -> &str {
        &self.request_channel
    }

    /// `{prefix}-response#{nsp}#`, exact subscribe.
    pub fn response_channel(&self) -> &str {
        &self.response_channel
    }

    /// `{responseChannel}{serverId}#`, exact subscribe.
    pub fn specific_response_channel(&self, server_id: &str) -> String {
        format!("{}{server_id}#", self.response_channel)
    }

    /// Extracts the room suffix from a channel that matched the broadcast
    /// pattern, per base spec §4.4: `room := channel[len(broadcastChannel)..len(channel)-1]`.
    ///
    /// Returns `None` if `channel` is not at least as long as `broadcastChannel`
    /// plus its own trailing `#` — the empty-room-suffix edge the base spec
    /// calls out explicitly.
    pub fn room_suffix<'a>(&self, channel: &'a str) -> Option<&'a str> {
        let prefix_len = self.broadcast_channel.len();
        if channel.len() <= prefix_len || !channel.starts_with(&self.broadcast_channel) {
            return None;
        }
        Some(&channel[prefix_len..channel.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namer() -> ChannelNamer {
        ChannelNamer::new("socket.io", "/")
    }

    #[test]
    fn channel_names_match_base_spec_table() {
        let namer = namer();
        assert_eq!(namer.broadcast_channel(), "socket.io#/#");
        assert_eq!(namer.room_channel("r1"), "socket.io#/#r1#");
        assert_eq!(namer.request_channel(), "socket.io-request#/#");
        assert_eq!(namer.response_channel(), "socket.io-response#/#");
        assert_eq!(
            namer.specific_response_channel("AAAAAA"),
            "socket.io-response#/#AAAAAA#"
        );
    }

    #[test]
    fn broadcast_pattern_appends_star() {
        assert_eq!(namer().broadcast_pattern(), "socket.io#/#*");
    }

    #[test]
    fn room_suffix_extracts_room_name() {
        let namer = namer();
        assert_eq!(namer.room_suffix("socket.io#/#r1#"), Some("r1"));
    }

    #[test]
    fn room_suffix_is_empty_string_for_bare_broadcast_channel() {
        let namer = namer();
        assert_eq!(namer.room_suffix("socket.io#/#"), None);
    }

    #[test]
    fn room_suffix_none_for_unrelated_channel() {
        let namer = namer();
        assert_eq!(namer.room_suffix("socket.io-request#/#"), None);
    }

    #[test]
    fn names_are_stable_for_same_inputs() {
        assert_eq!(namer(), namer());
    }
}
