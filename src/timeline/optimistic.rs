use super::post::Post;
use super::store::PostStore;

/// Boolean post fields that can be changed ahead of server confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagField {
    Bookmarked,
    Read,
}

impl FlagField {
    fn slot(self, post: &mut Post) -> &mut bool {
        match self {
            FlagField::Bookmarked => &mut post.is_bookmarked,
            FlagField::Read => &mut post.is_read,
        }
    }
}

/// A flag flipped optimistically, remembering the value to restore if the
/// server rejects the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticFlag {
    post_id: String,
    field: FlagField,
    previous: bool,
}

impl OptimisticFlag {
    /// Flip `field` on `post_id`. Returns `None` if the post is unknown.
    pub fn flip(store: &mut PostStore, post_id: &str, field: FlagField) -> Option<Self> {
        let slot = field.slot(store.get_mut(post_id)?);
        let previous = *slot;
        *slot = !previous;
        Some(Self {
            post_id: post_id.to_string(),
            field,
            previous,
        })
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn field(&self) -> FlagField {
        self.field
    }

    pub fn previous(&self) -> bool {
        self.previous
    }

    /// Value written by `flip`.
    pub fn applied(&self) -> bool {
        !self.previous
    }

    /// Restore the previous value. Returns false if the post disappeared in
    /// the meantime.
    pub fn rollback(&self, store: &mut PostStore) -> bool {
        match store.get_mut(&self.post_id) {
            Some(post) => {
                *self.field.slot(post) = self.previous;
                true
            }
            None => false,
        }
    }
}
