pub mod onebot;

pub use onebot::OneBotClient;
