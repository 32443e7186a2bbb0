use sqlx::PgPool;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

pub mod comment;
pub(crate) mod country;
pub mod listing;
pub mod post;
pub mod user;

use comment::{CommentController, DynCommentCtrl};
use listing::{DynListingCtrl, ListingController};
use post::{DynPostCtrl, PostController};
use user::{DynUserCtrl, UserController};

pub type DynStore = Arc<dyn StoreTrait + Send + Sync>;

/// Hands out one controller per table.
///
/// Handlers only ever see this trait, so their tests can swap in `MockStoreTrait`
/// without a database.
#[cfg_attr(test, automock)]
pub trait StoreTrait {
    fn user(&self) -> DynUserCtrl;
    fn post(&self) -> DynPostCtrl;
    fn comment(&self) -> DynCommentCtrl;
    fn listing(&self) -> DynListingCtrl;
}

#[derive(Clone)]
pub struct Store {
    pub pool: PgPool,
    pub user: UserController,
    pub post: PostController,
    pub comment: CommentController,
    pub listing: ListingController,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        let user = UserController::new(pool.clone());
        let post = PostController::new(pool.clone());
        let comment = CommentController::new(pool.clone());
        let listing = ListingController::new(pool.clone());
        Self {
            pool,
            user,
            post,
            comment,
            listing,
        }
    }
}

impl StoreTrait for Store {
    fn user(&self) -> DynUserCtrl {
        Arc::new(self.user.clone())
    }

    fn post(&self) -> DynPostCtrl {
        Arc::new(self.post.clone())
    }

    fn comment(&self) -> DynCommentCtrl {
        Arc::new(self.comment.clone())
    }

    fn listing(&self) -> DynListingCtrl {
        Arc::new(self.listing.clone())
    }
}
