use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use serde::Deserialize;
use shared::{Error, Result};
use taleshelf::domain::{
    CoverImage, CreateStoryData, PaginationOptions, SortField, SortOrder, StoryFilters,
    UpdateStoryData,
};

/// Query string of `GET /stories`.
#[derive(Debug, Default, Deserialize)]
pub struct StoriesQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
    pub author_id: Option<String>,
    pub search: Option<String>,
    /// Defaults to `true`. `false` is only honored for viewers allowed to
    /// see drafts.
    pub is_published: Option<bool>,
}

impl StoriesQuery {
    pub fn into_parts(self) -> (StoryFilters, PaginationOptions) {
        let filters = StoryFilters {
            author_id: self.author_id,
            search: self.search,
            is_published: Some(self.is_published.unwrap_or(true)),
        };
        let pagination = PaginationOptions {
            page: self.page,
            limit: self.limit,
            sort_by: self.sort_by,
            sort_order: self.sort_order,
        };
        (filters, pagination)
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Cover image sent inline as base64.
#[derive(Debug, Deserialize)]
pub struct CoverUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: String,
}

impl CoverUpload {
    pub fn decode(self) -> Result<CoverImage> {
        let bytes = STANDARD
            .decode(self.data.trim())
            .map_err(|e| Error::Upload(format!("cover image is not valid base64: {e}")))?;

        Ok(CoverImage {
            file_name: self.file_name,
            content_type: self.content_type,
            bytes: Bytes::from(bytes),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateStoryRequest {
    pub title: String,
    pub content: String,
    pub cover_image: Option<CoverUpload>,
    #[serde(default)]
    pub is_published: bool,
}

impl CreateStoryRequest {
    pub fn into_data(self) -> Result<CreateStoryData> {
        Ok(CreateStoryData {
            title: self.title,
            content: self.content,
            cover_image: self.cover_image.map(CoverUpload::decode).transpose()?,
            is_published: self.is_published,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateStoryRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub cover_image: Option<CoverUpload>,
    pub is_published: Option<bool>,
}

impl UpdateStoryRequest {
    pub fn into_data(self) -> Result<UpdateStoryData> {
        Ok(UpdateStoryData {
            title: self.title,
            content: self.content,
            cover_image: self.cover_image.map(CoverUpload::decode).transpose()?,
            is_published: self.is_published,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_defaults_to_published() {
        let (filters, pagination) = StoriesQuery::default().into_parts();
        assert_eq!(filters.is_published, Some(true));
        assert_eq!(pagination, PaginationOptions::default());
    }

    #[test]
    fn test_cover_is_decoded_from_base64() {
        let request: CreateStoryRequest = serde_json::from_str(
            r#"{
                "title": "Moon",
                "content": "{}",
                "cover_image": {"file_name": "moon.png", "content_type": "image/png", "data": "aGVsbG8="}
            }"#,
        )
        .unwrap();

        let data = request.into_data().unwrap();
        assert!(!data.is_published);
        assert_eq!(data.cover_image.unwrap().bytes, Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_invalid_base64_is_an_upload_error() {
        let upload = CoverUpload {
            file_name: "x.png".into(),
            content_type: "image/png".into(),
            data: "***".into(),
        };
        assert!(matches!(upload.decode(), Err(Error::Upload(_))));
    }
}
