//! Fixed texts the bot sends back to chats.

/// Reply to `/start`.
pub const START: &str = "Hey! I can help notify everyone 📢 in the group when someone needs them. \
Everyone who wishes to receive mentions needs to /in to opt-in. \
All opted-in users can then be mentioned using /all";

/// Reply to `/all` when nobody has opted in.
pub const NO_USERS: &str = "There are no users. To opt in type /in command";

/// Reply to `/clean` from a non-admin.
pub const SWEEP_ADMIN_ONLY: &str = "Only chat admins can clean up the list.";

/// Reply to `/clean` when the bot cannot see chat members.
pub const SWEEP_NO_RIGHTS: &str = "I need admin rights in this chat to check who is still here.";

pub fn opted_in(name: &str) -> String {
    format!("Thanks for opting in {name}")
}

pub fn opted_out(name: &str) -> String {
    format!("You've been opted out {name}")
}

pub fn sweep_done(removed: usize) -> String {
    format!("Removed {removed} users who are no longer in this chat.")
}

/// Monospace summary, sent as MarkdownV2.
pub fn stats(users: i64, chats: i64, groups: i64) -> String {
    format!("`Users:  {users:6}\nChats:  {chats:6}\nGroups: {groups:6}`")
}

/// Reply when a command fails.
pub fn failure(err: &anyhow::Error) -> String {
    format!("Sorry, that didn't work: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_are_right_aligned() {
        assert_eq!(stats(12, 3, 1), "`Users:      12\nChats:       3\nGroups:      1`");
    }
}
