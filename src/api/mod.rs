//! 各プラットフォームの上流APIクライアント

pub mod credentials;
pub mod hls;
pub mod twitch;
pub mod twitch_gql;
pub mod youtube;
