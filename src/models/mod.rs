mod card;
mod merchant;
mod notification;

pub use card::{Card, RewardRate};
pub use merchant::Merchant;
pub use notification::Notification;
