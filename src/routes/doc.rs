use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest, UserResponse},
        cart::{AddCartItemRequest, CartItemView, CartView, UpdateCartItemRequest},
        categories::{CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
        products::{CreateProductRequest, ProductList, UpdateProductRequest},
    },
    models::{Category, Product},
    response::{ApiResponse, Meta},
    routes::{auth, cart, categories, health, params, products},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::login,
        auth::register,
        cart::get_cart,
        cart::add_item,
        cart::update_item,
        cart::remove_item,
        cart::clear_cart,
        categories::list_categories,
        categories::get_category,
        categories::get_category_products,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        products::list_products,
        products::create_product,
        products::get_product,
        products::update_product,
        products::delete_product
    ),
    components(
        schemas(
            Category,
            Product,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            UserResponse,
            AddCartItemRequest,
            UpdateCartItemRequest,
            CartItemView,
            CartView,
            CreateCategoryRequest,
            UpdateCategoryRequest,
            CategoryList,
            CreateProductRequest,
            UpdateProductRequest,
            ProductList,
            params::Pagination,
            params::ProductQuery,
            Meta,
            ApiResponse<Product>,
            ApiResponse<ProductList>,
            ApiResponse<Category>,
            ApiResponse<CategoryList>,
            ApiResponse<CartView>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Categories", description = "Category endpoints"),
        (name = "Products", description = "Product endpoints"),
        (name = "Cart", description = "Cart endpoints"),
        (name = "Auth", description = "Authentication endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
