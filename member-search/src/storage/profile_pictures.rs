use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::members::{MemberStore, StoreError};
use crate::metrics_consts::{
    ORPHANED_OBJECTS_REMOVED, PROFILE_PICTURES_UPLOADED, PROFILE_PICTURE_UPLOAD_FAILED,
};
use crate::storage::{ObjectStore, ObjectStoreError};

pub const PROFILE_PICTURES_BUCKET: &str = "profile-pictures";
pub const MAX_PROFILE_PICTURE_BYTES: usize = 5 * 1024 * 1024;

/// Accepted MIME types and the extension their objects are stored under.
const ALLOWED_IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
];

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("upload body is empty")]
    EmptyBody,
    #[error("upload of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] ObjectStoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedImage {
    pub mime_type: &'static str,
    pub extension: &'static str,
}

/// Checks an upload against the bucket's limits. `content_type` may carry
/// parameters (`image/png; q=1`); only the essence is compared.
pub fn validate_upload(
    content_type: Option<&str>,
    size: usize,
) -> Result<ValidatedImage, UploadError> {
    if size == 0 {
        return Err(UploadError::EmptyBody);
    }
    if size > MAX_PROFILE_PICTURE_BYTES {
        return Err(UploadError::TooLarge {
            size,
            max: MAX_PROFILE_PICTURE_BYTES,
        });
    }

    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    ALLOWED_IMAGE_TYPES
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(mime_type, extension)| ValidatedImage {
            mime_type,
            extension,
        })
        .ok_or(UploadError::UnsupportedMediaType(essence))
}

/// `<member_id>/<uuid>.<ext>`. A fresh name per upload keeps cached public
/// URLs of earlier pictures from serving the new image.
pub fn object_key(member_id: Uuid, extension: &str) -> String {
    format!("{}/{}.{}", member_id, Uuid::now_v7(), extension)
}

/// Validates, uploads and records a member's profile picture, returning its public URL.
#[instrument(skip_all, fields(member_id = %member_id, size = body.len()))]
pub async fn upload_profile_picture(
    objects: &dyn ObjectStore,
    store: &dyn MemberStore,
    member_id: Uuid,
    content_type: Option<&str>,
    body: Bytes,
) -> Result<String, UploadError> {
    let result = upload(objects, store, member_id, content_type, body).await;
    match &result {
        Ok(_) => counter!(PROFILE_PICTURES_UPLOADED).increment(1),
        Err(e) => {
            let cause = match e {
                UploadError::EmptyBody
                | UploadError::TooLarge { .. }
                | UploadError::UnsupportedMediaType(_) => "validation",
                UploadError::Store(_) => "store",
                UploadError::Storage(_) => "storage",
            };
            counter!(PROFILE_PICTURE_UPLOAD_FAILED, "cause" => cause).increment(1);
        }
    }
    result
}

async fn upload(
    objects: &dyn ObjectStore,
    store: &dyn MemberStore,
    member_id: Uuid,
    content_type: Option<&str>,
    body: Bytes,
) -> Result<String, UploadError> {
    let image = validate_upload(content_type, body.len())?;

    // Unknown members are rejected before anything is written to the bucket
    store.fetch_member(member_id).await?;

    let key = object_key(member_id, image.extension);
    objects
        .put_object(PROFILE_PICTURES_BUCKET, &key, body, image.mime_type)
        .await?;
    let url = objects.public_url(PROFILE_PICTURES_BUCKET, &key);

    if let Err(e) = store.set_profile_picture_url(member_id, &url).await {
        remove_orphan(objects, &key).await;
        return Err(e.into());
    }

    info!(key = %key, "profile picture uploaded");
    Ok(url)
}

async fn remove_orphan(objects: &dyn ObjectStore, key: &str) {
    match objects.delete_object(PROFILE_PICTURES_BUCKET, key).await {
        Ok(()) => counter!(ORPHANED_OBJECTS_REMOVED).increment(1),
        Err(e) => error!(key = %key, "failed to remove orphaned profile picture: {}", e),
    }
}
