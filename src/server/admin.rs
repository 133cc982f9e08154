use super::traits::{CreatedIdentity, IdentityAdmin};
use crate::identity::{FirebaseClient, IdentityError};

impl IdentityAdmin for FirebaseClient {
    async fn create_identity(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<CreatedIdentity, IdentityError> {
        let grant = self.sign_up(email, password, Some(display_name)).await?;
        Ok(CreatedIdentity {
            uid: grant.user.uid,
            email: email.to_owned(),
            id_token: grant.id_token,
        })
    }

    async fn delete_identity(&self, identity: &CreatedIdentity) -> Result<(), IdentityError> {
        self.delete_account(&identity.id_token).await
    }
}
