use async_trait::async_trait;
use chrono::{DateTime, Utc};
use djax_core::Result;
use djax_core::models::Fields;
use djax_core::remote::{ContentApi, ContentImage, slugify};
use serde_json::json;
use tracing::instrument;

use super::AxilentClient;
use super::connection::App;
use super::wire;

#[async_trait]
impl ContentApi for AxilentClient {
    #[instrument(level = "debug", skip(self))]
    async fn get_content(&self, content_type: &str, key: &str) -> Result<ContentImage> {
        let body = json!({"content_type_slug": slugify(content_type), "content_key": key});
        wire::content_image(self.cx.call(App::Content, "getcontent", body).await?)
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_content_by_unique_field(
        &self,
        content_type: &str,
        field_name: &str,
        field_value: &str,
    ) -> Result<ContentImage> {
        let body = json!({
            "content_type": slugify(content_type),
            "field_name": field_name,
            "field_value": field_value,
        });
        let resp = self
            .cx
            .call(App::Content, "getcontentbyuniquefield", body)
            .await?;
        wire::content_image(resp)
    }

    #[instrument(level = "debug", skip(self, fields))]
    async fn create_content(&self, content_type: &str, fields: &Fields) -> Result<String> {
        let body = json!({"content_type_slug": slugify(content_type), "content": fields});
        let resp = self.cx.call(App::Content, "createcontent", body).await?;
        wire::key(resp, "content_key")
    }

    #[instrument(level = "debug", skip(self, fields))]
    async fn update_content(&self, content_type: &str, key: &str, fields: &Fields) -> Result<()> {
        let body = json!({
            "content_type_slug": slugify(content_type),
            "content_key": key,
            "content": fields,
        });
        self.cx.call(App::Content, "updatecontent", body).await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn content_keys(&self, content_type: &str) -> Result<Vec<String>> {
        let body = json!({"content_type_slug": slugify(content_type)});
        wire::string_list(self.cx.call(App::Content, "getcontentkeys", body).await?)
    }

    #[instrument(level = "debug", skip(self))]
    async fn latest_update(
        &self,
        content_type: &str,
        key: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let body = json!({"content_type_slug": slugify(content_type), "content_key": key});
        let resp = self.cx.call(App::Content, "latestupdate", body).await?;
        wire::latest_update(&resp)
    }

    #[instrument(level = "debug", skip(self))]
    async fn search(&self, query: &str, content_types: &[String]) -> Result<Vec<ContentImage>> {
        let types = content_types
            .iter()
            .map(|t| slugify(t))
            .collect::<Vec<_>>()
            .join(",");
        let body = json!({"query": query, "content_types": types});
        wire::content_list(self.cx.call(App::Content, "search", body).await?)
    }

    #[instrument(level = "debug", skip(self))]
    async fn delete_content(&self, content_type: &str, key: &str) -> Result<()> {
        let body = json!({"content_type_slug": slugify(content_type), "content_key": key});
        self.cx.call(App::Content, "deletecontent", body).await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn tag_content(&self, content_type: &str, key: &str, tag: &str) -> Result<()> {
        let body = json!({
            "content_type_slug": slugify(content_type),
            "content_key": key,
            "tag": tag,
        });
        self.cx.call(App::Content, "tagcontent", body).await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn detag_content(&self, content_type: &str, key: &str, tag: &str) -> Result<()> {
        let body = json!({
            "content_type_slug": slugify(content_type),
            "content_key": key,
            "tag": tag,
        });
        self.cx.call(App::Content, "detagcontent", body).await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn reindex_content(&self, content_type: &str, key: &str) -> Result<()> {
        let body = json!({"content_type_slug": slugify(content_type), "content_key": key});
        self.cx.call(App::Content, "reindexcontent", body).await?;
        Ok(())
    }
}
