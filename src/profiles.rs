//! Fixed user profiles exposed as JSON
//!
//! `/users` lists the stored image names as they are on disk, while `/me`
//! resolves its image to the retrieval URL.

use crate::upload::download_path;
use serde::Serialize;

/// Public view of a user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub username: String,
    pub theme: String,
    /// Stored file name, or its `/uploads/` URL for the current user
    pub image: String,
}

// (username, theme, stored image name)
const USERS: &[(&str, &str, &str)] = &[
    ("Kevin", "Halloween", "S.png"),
    ("Rustian", "Christmas", "Bajaj_Maxima_Cargo.jpeg"),
];

fn profile((username, theme, image): (&str, &str, &str)) -> UserProfile {
    UserProfile {
        username: username.to_string(),
        theme: theme.to_string(),
        image: image.to_string(),
    }
}

/// Every known user, images as bare stored names
pub fn all_users() -> Vec<UserProfile> {
    USERS.iter().copied().map(profile).collect()
}

/// The user the demo treats as signed in, image linked for download
pub fn current_user() -> UserProfile {
    let mut me = profile(USERS[0]);
    me.image = download_path(&me.image);
    me
}
