pub mod model;
pub mod money;
pub mod repository;
pub mod repository_sqlx;
pub mod view;

pub use model::{Cart, CartId, CartLine, CartStatus};
pub use repository::CartRepository;
pub use repository_sqlx::SqlxCartRepository;
pub use view::{CartView, LineView};
