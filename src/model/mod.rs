//! Domain model: guild aggregate, groups, tracked courses and id types.

pub mod group;
pub mod guild;
pub mod ids;

pub use group::{GROUP_PREFIX, Group, group_name, normalize_emoji};
pub use guild::{CanvasCourse, GroupConflict, Guild, validate_groups};
pub use ids::{ChannelId, GuildId, MessageId, RoleId, UserId};
