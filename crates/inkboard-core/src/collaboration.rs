//! Collaborators and their roles on a board.
//!
//! Every rule is checked here before anything is written, so a rejected
//! operation leaves storage untouched.

use crate::storage::{
    BoardId, BoardStore, Collaborator, CollaboratorId, Role, StorageError, UserId,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollaborationError {
    #[error("User {0} is already a collaborator on this board")]
    AlreadyCollaborator(UserId),
    #[error("No user found with email {0}")]
    UnknownUser(String),
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
    #[error("The owner role cannot be assigned")]
    OwnerAssignment,
    #[error("The board owner cannot be changed or removed")]
    OwnerImmutable,
    #[error("Collaborator {0} not found")]
    NotFound(CollaboratorId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

pub type CollaborationResult<T> = Result<T, CollaborationError>;

/// Role-checked access to a board's collaborator list.
pub struct CollaborationManager<'a, S: BoardStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: BoardStore + ?Sized> CollaborationManager<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn list(&self, board_id: BoardId) -> CollaborationResult<Vec<Collaborator>> {
        Ok(self.store.get_collaborators(board_id).await?)
    }

    /// Role of a user on a board, `None` if they have no access.
    pub async fn permission_for(
        &self,
        board_id: BoardId,
        user_id: UserId,
    ) -> CollaborationResult<Option<Role>> {
        let collaborators = self.list(board_id).await?;
        Ok(collaborators
            .iter()
            .find(|c| c.user_id == user_id)
            .map(|c| c.role))
    }

    /// Add a user with a non-owner role. The board becomes shared with its
    /// first such collaborator.
    pub async fn add(
        &self,
        board_id: BoardId,
        user_id: UserId,
        role: Role,
        invited_by: Option<UserId>,
    ) -> CollaborationResult<Collaborator> {
        if role == Role::Owner {
            return Err(CollaborationError::OwnerAssignment);
        }
        let existing = self.list(board_id).await?;
        if existing.iter().any(|c| c.user_id == user_id) {
            return Err(CollaborationError::AlreadyCollaborator(user_id));
        }

        let collaborator = self
            .store
            .add_collaborator(board_id, user_id, role, invited_by)
            .await?;
        log::info!(
            "Added {} as {:?} on board {}",
            user_id,
            role,
            board_id
        );

        let board = self.store.get_board(board_id).await?;
        if !board.shared {
            self.store.set_board_shared(board_id, true).await?;
            log::debug!("Board {} is now shared", board_id);
        }
        Ok(collaborator)
    }

    /// Resolve an email address to a user and add them.
    pub async fn invite_by_email(
        &self,
        board_id: BoardId,
        email: &str,
        role: Role,
        invited_by: Option<UserId>,
    ) -> CollaborationResult<Collaborator> {
        let email = email.trim();
        let valid = email
            .split_once('@')
            .is_some_and(|(name, domain)| !name.is_empty() && domain.contains('.'));
        if !valid {
            return Err(CollaborationError::InvalidEmail(email.to_string()));
        }
        let user = self
            .store
            .resolve_user_by_email(email)
            .await?
            .ok_or_else(|| CollaborationError::UnknownUser(email.to_string()))?;
        self.add(board_id, user.id, role, invited_by).await
    }

    pub async fn update_role(
        &self,
        board_id: BoardId,
        collaborator_id: CollaboratorId,
        role: Role,
    ) -> CollaborationResult<Collaborator> {
        let target = self.find(board_id, collaborator_id).await?;
        if target.role == Role::Owner {
            return Err(CollaborationError::OwnerImmutable);
        }
        if role == Role::Owner {
            return Err(CollaborationError::OwnerAssignment);
        }
        Ok(self
            .store
            .update_collaborator_role(collaborator_id, role)
            .await?)
    }

    pub async fn remove(
        &self,
        board_id: BoardId,
        collaborator_id: CollaboratorId,
    ) -> CollaborationResult<()> {
        let target = self.find(board_id, collaborator_id).await?;
        if target.role == Role::Owner {
            return Err(CollaborationError::OwnerImmutable);
        }
        self.store.remove_collaborator(collaborator_id).await?;
        log::info!("Removed {} from board {}", target.user_id, board_id);
        Ok(())
    }

    async fn find(
        &self,
        board_id: BoardId,
        collaborator_id: CollaboratorId,
    ) -> CollaborationResult<Collaborator> {
        self.list(board_id)
            .await?
            .into_iter()
            .find(|c| c.id == collaborator_id)
            .ok_or(CollaborationError::NotFound(collaborator_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Fixture, block_on};

    fn owner_row(fx: &Fixture, manager: &CollaborationManager<'_, crate::storage::MemoryStore>) -> Collaborator {
        block_on(manager.list(fx.board.id))
            .unwrap()
            .into_iter()
            .find(|c| c.role == Role::Owner)
            .unwrap()
    }

    #[test]
    fn test_add_marks_board_shared() {
        let fx = Fixture::new();
        let manager = CollaborationManager::new(fx.store.as_ref());
        assert!(!fx.board.shared);

        let guest = fx.user("guest@example.com");
        block_on(manager.add(fx.board.id, guest, Role::Editor, Some(fx.owner))).unwrap();
        let board = block_on(fx.store.get_board(fx.board.id)).unwrap();
        assert!(board.shared);
        assert_eq!(block_on(manager.list(fx.board.id)).unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_rejected_without_write() {
        let fx = Fixture::new();
        let manager = CollaborationManager::new(fx.store.as_ref());
        let guest = fx.user("guest@example.com");
        block_on(manager.add(fx.board.id, guest, Role::Viewer, Some(fx.owner))).unwrap();

        let again = block_on(manager.add(fx.board.id, guest, Role::Editor, Some(fx.owner)));
        assert!(matches!(again, Err(CollaborationError::AlreadyCollaborator(id)) if id == guest));
        let again = block_on(manager.add(fx.board.id, fx.owner, Role::Editor, None));
        assert!(matches!(again, Err(CollaborationError::AlreadyCollaborator(_))));
        assert_eq!(block_on(manager.list(fx.board.id)).unwrap().len(), 2);
    }

    #[test]
    fn test_owner_is_protected() {
        let fx = Fixture::new();
        let manager = CollaborationManager::new(fx.store.as_ref());
        let owner = owner_row(&fx, &manager);

        let downgrade = block_on(manager.update_role(fx.board.id, owner.id, Role::Editor));
        assert!(matches!(downgrade, Err(CollaborationError::OwnerImmutable)));
        let removal = block_on(manager.remove(fx.board.id, owner.id));
        assert!(matches!(removal, Err(CollaborationError::OwnerImmutable)));
        assert_eq!(owner_row(&fx, &manager).role, Role::Owner);
    }

    #[test]
    fn test_owner_role_cannot_be_granted() {
        let fx = Fixture::new();
        let manager = CollaborationManager::new(fx.store.as_ref());
        let guest = fx.user("guest@example.com");
        let added = block_on(manager.add(fx.board.id, guest, Role::Owner, None));
        assert!(matches!(added, Err(CollaborationError::OwnerAssignment)));

        let row = block_on(manager.add(fx.board.id, guest, Role::Viewer, None)).unwrap();
        let promoted = block_on(manager.update_role(fx.board.id, row.id, Role::Owner));
        assert!(matches!(promoted, Err(CollaborationError::OwnerAssignment)));
    }

    #[test]
    fn test_update_and_remove() {
        let fx = Fixture::new();
        let manager = CollaborationManager::new(fx.store.as_ref());
        let guest = fx.user("guest@example.com");
        let row = block_on(manager.add(fx.board.id, guest, Role::Viewer, None)).unwrap();

        let updated = block_on(manager.update_role(fx.board.id, row.id, Role::Commenter)).unwrap();
        assert_eq!(updated.role, Role::Commenter);

        block_on(manager.remove(fx.board.id, row.id)).unwrap();
        assert_eq!(block_on(manager.permission_for(fx.board.id, guest)).unwrap(), None);
        let missing = block_on(manager.remove(fx.board.id, row.id));
        assert!(matches!(missing, Err(CollaborationError::NotFound(_))));
    }

    #[test]
    fn test_invite_by_email() {
        let fx = Fixture::new();
        let manager = CollaborationManager::new(fx.store.as_ref());
        let guest = fx.user("guest@example.com");

        let row = block_on(manager.invite_by_email(
            fx.board.id,
            " Guest@Example.com ",
            Role::Viewer,
            Some(fx.owner),
        ))
        .unwrap();
        assert_eq!(row.user_id, guest);

        let unknown =
            block_on(manager.invite_by_email(fx.board.id, "nobody@example.com", Role::Viewer, None));
        assert!(matches!(unknown, Err(CollaborationError::UnknownUser(_))));
        let invalid = block_on(manager.invite_by_email(fx.board.id, "not-an-email", Role::Viewer, None));
        assert!(matches!(invalid, Err(CollaborationError::InvalidEmail(_))));
    }

    #[test]
    fn test_viewer_role_exposed() {
        let fx = Fixture::new();
        let manager = CollaborationManager::new(fx.store.as_ref());
        let guest = fx.user("viewer@example.com");
        block_on(manager.add(fx.board.id, guest, Role::Viewer, Some(fx.owner))).unwrap();

        let role = block_on(manager.permission_for(fx.board.id, guest)).unwrap();
        assert_eq!(role, Some(Role::Viewer));
        assert!(!role.is_some_and(Role::can_edit));
        assert_eq!(
            block_on(manager.permission_for(fx.board.id, fx.owner)).unwrap(),
            Some(Role::Owner)
        );
    }
}
