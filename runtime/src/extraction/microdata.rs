//! Microdata (`itemprop`) and CSS-selector helpers.

use crate::extraction::{squash_ws, ProductRecord};
use scraper::{ElementRef, Html, Selector};

/// First element matching `css`. Invalid selectors match nothing.
pub fn first<'a>(document: &'a Html, css: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(css).ok()?;
    document.select(&sel).next()
}

/// Every element matching `css`.
pub fn all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(sel) => document.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

/// Elements matching `css` inside `scope`.
pub fn within<'a>(scope: ElementRef<'a>, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(sel) => scope.select(&sel).collect(),
        Err(_) => Vec::new(),
    }
}

/// Whitespace-collapsed text content.
pub fn text_of(el: ElementRef<'_>) -> String {
    squash_ws(&el.text().collect::<String>())
}

/// Value of an itemprop element: `content` attribute or its text.
pub fn itemprop_text(el: ElementRef<'_>) -> String {
    el.value()
        .attr("content")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| text_of(el))
}

/// Value of the first `[itemprop=name]` element.
pub fn itemprop(document: &Html, name: &str) -> Option<String> {
    let el = first(document, &format!(r#"[itemprop="{name}"]"#))?;
    let text = itemprop_text(el);
    (!text.is_empty()).then_some(text)
}

/// Text of the first element matching `css`, if non-empty.
pub fn select_text(document: &Html, css: &str) -> Option<String> {
    let text = text_of(first(document, css)?);
    (!text.is_empty()).then_some(text)
}

/// Attribute of the first element matching `css`, if non-empty.
pub fn select_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    first(document, css)?
        .value()
        .attr(attr)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// First run of ASCII digits in `text`.
pub fn first_number(text: &str) -> Option<String> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    Some(digits)
}

/// Product fields from standard schema.org microdata.
pub fn product(document: &Html) -> ProductRecord {
    let availability = first(document, r#"[itemprop="availability"]"#)
        .and_then(|el| {
            el.value()
                .attr("href")
                .or_else(|| el.value().attr("content"))
                .map(str::to_string)
        })
        .unwrap_or_default();

    let brand = first(document, r#"[itemprop="brand"]"#)
        .map(|el| {
            within(el, r#"[itemprop="name"]"#)
                .into_iter()
                .next()
                .map(itemprop_text)
                .unwrap_or_else(|| itemprop_text(el))
        })
        .unwrap_or_default();

    let gtin = ["gtin13", "gtin12", "gtin14", "gtin8", "gtin"]
        .iter()
        .find_map(|p| itemprop(document, p))
        .unwrap_or_default();

    ProductRecord {
        name: itemprop(document, "name").unwrap_or_default(),
        sku: itemprop(document, "sku").unwrap_or_default(),
        mpn: itemprop(document, "mpn").unwrap_or_default(),
        product_id: itemprop(document, "productID")
            .or_else(|| itemprop(document, "productId"))
            .unwrap_or_default(),
        price: itemprop(document, "price").unwrap_or_default(),
        main_image: first(document, r#"[itemprop="image"]"#)
            .and_then(|el| {
                el.value()
                    .attr("content")
                    .or_else(|| el.value().attr("src"))
                    .or_else(|| el.value().attr("href"))
                    .map(str::to_string)
            })
            .unwrap_or_default(),
        description: itemprop(document, "description").unwrap_or_default(),
        status: if availability.is_empty() {
            String::new()
        } else {
            crate::extraction::jsonld::availability_status(&availability).to_string()
        },
        brand,
        gtin,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
        <div itemscope itemtype="https://schema.org/Product">
          <h1 itemprop="name">  Oak   Desk </h1>
          <span itemprop="sku">D-100</span>
          <div itemprop="brand" itemscope><span itemprop="name">Bison</span></div>
          <meta itemprop="gtin12" content="012345678905">
          <meta itemprop="image" content="https://cdn/desk.jpg">
          <div itemprop="offers" itemscope>
            <div itemprop="price" content="249.00">$249.00</div>
            <link itemprop="availability" href="https://schema.org/InStock">
          </div>
        </div>
        <div class="qty">Only 3 left</div>
      </body></html>"#;

    #[test]
    fn test_product_microdata() {
        let doc = Html::parse_document(PAGE);
        let p = product(&doc);
        assert_eq!(p.name, "Oak Desk");
        assert_eq!(p.sku, "D-100");
        assert_eq!(p.brand, "Bison");
        assert_eq!(p.gtin, "012345678905");
        assert_eq!(p.price, "249.00");
        assert_eq!(p.main_image, "https://cdn/desk.jpg");
        assert_eq!(p.status, "In Stock");
    }

    #[test]
    fn test_select_helpers() {
        let doc = Html::parse_document(PAGE);
        assert_eq!(select_text(&doc, "div.qty").as_deref(), Some("Only 3 left"));
        assert_eq!(
            select_attr(&doc, r#"meta[itemprop="image"]"#, "content").as_deref(),
            Some("https://cdn/desk.jpg")
        );
        assert!(select_text(&doc, "div.missing").is_none());
        assert!(first(&doc, "[[invalid").is_none());
    }

    #[test]
    fn test_first_number() {
        assert_eq!(first_number("Product ID: 99064").as_deref(), Some("99064"));
        assert_eq!(first_number("none"), None);
    }
}
