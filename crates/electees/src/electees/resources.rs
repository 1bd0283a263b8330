//! Term-scoped onboarding resources and packets.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{
    Attachment, ElecteeResource, ElecteeResourceType, NewElecteeResource, ResourceId,
    ResourceTypeId, Term,
};
use super::portal::PortalError;
use super::repository::{ElecteeRepository, ResourceStorage};
use super::rows::{
    bind_rows, required_value, BatchSummary, Cleaned, FieldErrors, RowFields, RowInput, RowRules,
};

const MAX_FILE_NAME_LEN: usize = 100;

/// A file received with a resource row. Only the name round-trips through
/// the rendered page.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    pub file_name: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("file_name", &self.file_name)
            .field("size", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceFields {
    #[serde(default)]
    pub resource_type: Option<ResourceTypeId>,
    #[serde(default)]
    pub upload: Option<Upload>,
}

impl RowFields for ResourceFields {
    fn is_blank(&self) -> bool {
        self.resource_type.is_none() && self.upload.is_none()
    }
}

impl From<&ElecteeResource> for ResourceFields {
    fn from(resource: &ElecteeResource) -> Self {
        Self {
            resource_type: Some(resource.resource_type),
            upload: None,
        }
    }
}

pub type ResourceRow = RowInput<ResourceId, ResourceFields>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedResource {
    #[serde(flatten)]
    pub resource: ElecteeResource,
    pub type_name: String,
}

/// Term resources split the way the overview shows them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceListing {
    pub packets: Vec<ListedResource>,
    pub resources: Vec<ListedResource>,
}

pub struct ResourceService<R> {
    repository: Arc<R>,
    storage: Arc<dyn ResourceStorage>,
    uploads: AtomicU64,
}

impl<R> ResourceService<R>
where
    R: ElecteeRepository + 'static,
{
    pub fn new(repository: Arc<R>, storage: Arc<dyn ResourceStorage>) -> Self {
        Self {
            repository,
            storage,
            uploads: AtomicU64::new(0),
        }
    }

    pub fn resource_types(&self) -> Result<Vec<ElecteeResourceType>, PortalError> {
        let mut types = self.repository.resource_types()?;
        types.sort_by(|a, b| (&a.name, a.id).cmp(&(&b.name, b.id)));
        Ok(types)
    }

    pub fn resources(&self, term: &Term) -> Result<Vec<ElecteeResource>, PortalError> {
        let mut resources = self.repository.resources_for_term(term.id)?;
        resources.sort_by_key(|resource| resource.id);
        Ok(resources)
    }

    /// Packets and individual resources for the term, each ordered by type name.
    pub fn listing(&self, term: &Term) -> Result<ResourceListing, PortalError> {
        let types: HashMap<ResourceTypeId, ElecteeResourceType> = self
            .repository
            .resource_types()?
            .into_iter()
            .map(|kind| (kind.id, kind))
            .collect();

        let mut listing = ResourceListing::default();
        for resource in self.resources(term)? {
            let Some(kind) = types.get(&resource.resource_type) else {
                warn!(resource = %resource.id, "resource has an unknown type; skipping");
                continue;
            };
            let entry = ListedResource {
                type_name: kind.name.clone(),
                resource,
            };
            if kind.is_packet {
                listing.packets.push(entry);
            } else {
                listing.resources.push(entry);
            }
        }
        for list in [&mut listing.packets, &mut listing.resources] {
            list.sort_by(|a, b| {
                (&a.type_name, a.resource.id).cmp(&(&b.type_name, b.resource.id))
            });
        }
        Ok(listing)
    }

    /// Create, retype, replace or remove the term's resources.
    ///
    /// Files are stored before the batch is written; if the write fails the
    /// new files are removed again. Files no longer referenced afterwards are
    /// removed on a best-effort basis.
    pub fn edit(&self, term: &Term, rows: &[ResourceRow]) -> Result<BatchSummary, PortalError> {
        let types: Vec<ResourceTypeId> = self
            .repository
            .resource_types()?
            .iter()
            .map(|kind| kind.id)
            .collect();
        let existing = self.repository.resources_for_term(term.id)?;

        let mut pending: Vec<(String, Vec<u8>)> = Vec::new();
        let batch = bind_rows(rows, &existing, RowRules::default(), |fields, current| {
            let mut errors = FieldErrors::new();
            let resource_type = required_value(&mut errors, "resource_type", fields.resource_type);
            if let Some(kind) = resource_type {
                if !types.contains(&kind) {
                    errors.add(
                        "resource_type",
                        "Select a valid choice. That choice is not one of the available choices.",
                    );
                }
            }

            let attachment = match (&fields.upload, current) {
                (Some(upload), _) => self.attachment(&mut errors, term, upload),
                (None, Some(resource)) => Some(resource.attachment.clone()),
                (None, None) => {
                    errors.add("attachment", "This field is required.");
                    None
                }
            };

            let (Some(resource_type), Some(attachment)) = (resource_type, attachment) else {
                return Err(errors);
            };
            errors.finish(())?;

            if let Some(upload) = &fields.upload {
                pending.push((attachment.storage_key.clone(), upload.bytes.clone()));
            }
            Ok(match current {
                Some(resource) => Cleaned::Update(ElecteeResource {
                    resource_type,
                    attachment,
                    ..resource.clone()
                }),
                None => Cleaned::Create(NewElecteeResource {
                    term: term.id,
                    resource_type,
                    attachment,
                }),
            })
        })?;

        let mut stored = Vec::with_capacity(pending.len());
        for (key, bytes) in &pending {
            if let Err(err) = self.storage.put(key, bytes) {
                self.discard(&stored);
                return Err(err.into());
            }
            stored.push(key.clone());
        }

        let mut stale: Vec<String> = existing
            .iter()
            .filter(|resource| batch.deleted.contains(&resource.id))
            .map(|resource| resource.attachment.storage_key.clone())
            .collect();
        for updated in &batch.updated {
            if let Some(previous) = existing.iter().find(|resource| resource.id == updated.id) {
                if previous.attachment.storage_key != updated.attachment.storage_key {
                    stale.push(previous.attachment.storage_key.clone());
                }
            }
        }

        let summary = batch.summary();
        if let Err(err) = self.repository.apply_resource_batch(batch) {
            self.discard(&stored);
            return Err(err.into());
        }
        self.discard(&stale);

        info!(term = %term.id, ?summary, uploaded = stored.len(), "electee resources updated");
        Ok(summary)
    }

    fn attachment(&self, errors: &mut FieldErrors, term: &Term, upload: &Upload) -> Option<Attachment> {
        let file_name = upload
            .file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        if file_name.is_empty() {
            errors.add("attachment", "No file was submitted.");
            return None;
        }
        if file_name.chars().count() > MAX_FILE_NAME_LEN {
            errors.add(
                "attachment",
                format!("Ensure this filename has at most {MAX_FILE_NAME_LEN} characters."),
            );
            return None;
        }
        if upload.bytes.is_empty() {
            errors.add("attachment", "The submitted file is empty.");
            return None;
        }

        let sequence = self.uploads.fetch_add(1, Ordering::Relaxed);
        let content_type = mime_guess::from_path(&file_name)
            .first_or(mime::APPLICATION_OCTET_STREAM)
            .essence_str()
            .to_string();
        Some(Attachment {
            storage_key: format!("electee_resources/{}/{sequence}-{file_name}", term.id),
            content_type,
            size: upload.bytes.len() as u64,
            file_name,
        })
    }

    fn discard(&self, keys: &[String]) {
        for key in keys {
            if let Err(err) = self.storage.remove(key) {
                warn!(%key, error = %err, "failed to remove stored resource file");
            }
        }
    }
}
