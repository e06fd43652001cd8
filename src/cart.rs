use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::hash::{Hash, Hasher};

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Recoverable cart mutation failures. None of these are fatal; the HTTP
/// layer maps them to client-facing statuses.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CartError {
    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(i32),

    #[error("product {0} is not in the cart")]
    ProductNotInCart(Uuid),

    #[error("product {0} is already in the cart")]
    DuplicateProduct(Uuid),
}

/// One line entry: a product reference, the unit price captured when the
/// line was loaded, and a positive quantity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartLine {
    product_id: Uuid,
    unit_price: Decimal,
    quantity: i32,
}

impl CartLine {
    pub fn new(product_id: Uuid, unit_price: Decimal, quantity: i32) -> Result<Self, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        Ok(Self {
            product_id,
            unit_price,
            quantity,
        })
    }

    pub fn product_id(&self) -> Uuid {
        self.product_id
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn quantity(&self) -> i32 {
        self.quantity
    }

    /// Unit price times quantity, exact.
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A customer's in-progress purchases, one line per product.
///
/// Lines are keyed by product id, which makes the "one line per product"
/// rule structural instead of a caller convention. The total is always
/// computed from the lines; nothing is cached or stored alongside them.
#[derive(Debug, Clone)]
pub struct Cart {
    customer_id: Uuid,
    lines: BTreeMap<Uuid, CartLine>,
}

impl Cart {
    pub fn new(customer_id: Uuid) -> Self {
        Self {
            customer_id,
            lines: BTreeMap::new(),
        }
    }

    pub fn customer_id(&self) -> Uuid {
        self.customer_id
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines in product-id order.
    pub fn lines(&self) -> impl Iterator<Item = &CartLine> {
        self.lines.values()
    }

    pub fn line(&self, product_id: Uuid) -> Option<&CartLine> {
        self.lines.get(&product_id)
    }

    /// Adds a line. An existing line for the same product has the incoming
    /// quantity merged into it instead of being duplicated or replaced.
    /// The merged quantity saturates at `i32::MAX`, so two individually
    /// valid adds can never wrap or panic.
    pub fn add_line(&mut self, line: CartLine) -> &CartLine {
        match self.lines.entry(line.product_id) {
            Entry::Occupied(entry) => {
                let existing = entry.into_mut();
                existing.quantity = existing.quantity.saturating_add(line.quantity);
                // the incoming line carries the latest catalog price
                existing.unit_price = line.unit_price;
                existing
            }
            Entry::Vacant(entry) => entry.insert(line),
        }
    }

    /// Strict variant of [`Cart::add_line`] for loading stored rows: a
    /// second line for the same product means the row set violates the
    /// uniqueness constraint and is reported, not merged.
    pub fn insert_line(&mut self, line: CartLine) -> Result<(), CartError> {
        match self.lines.entry(line.product_id) {
            Entry::Occupied(_) => Err(CartError::DuplicateProduct(line.product_id)),
            Entry::Vacant(entry) => {
                entry.insert(line);
                Ok(())
            }
        }
    }

    /// Replaces the quantity of an existing line. The cart is untouched on
    /// error: an absent product reports `ProductNotInCart`.
    pub fn set_quantity(
        &mut self,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<&CartLine, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity(quantity));
        }
        match self.lines.get_mut(&product_id) {
            Some(line) => {
                line.quantity = quantity;
                Ok(line)
            }
            None => Err(CartError::ProductNotInCart(product_id)),
        }
    }

    /// Removes the line for a product. Idempotent: removing an absent
    /// product returns `None` and leaves the cart as it was.
    pub fn remove_product(&mut self, product_id: Uuid) -> Option<CartLine> {
        self.lines.remove(&product_id)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Sum of line totals; exactly zero for an empty cart.
    pub fn total(&self) -> Decimal {
        self.lines
            .values()
            .fold(Decimal::ZERO, |total, line| total + line.line_total())
    }
}

/// One active cart per customer: carts compare and hash by customer alone,
/// so a customer's cart is interchangeable in sets and maps regardless of
/// its current contents. The schema backs this with `UNIQUE (customer_id)`.
impl PartialEq for Cart {
    fn eq(&self, other: &Self) -> bool {
        self.customer_id == other.customer_id
    }
}

impl Eq for Cart {}

impl Hash for Cart {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.customer_id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use rust_decimal::dec;

    use super::*;

    fn line(product_id: Uuid, unit_price: Decimal, quantity: i32) -> CartLine {
        CartLine::new(product_id, unit_price, quantity).unwrap()
    }

    fn hash_of(cart: &Cart) -> u64 {
        let mut hasher = DefaultHasher::new();
        cart.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn total_is_exact_sum_of_line_totals() {
        let mut cart = Cart::new(Uuid::new_v4());
        cart.add_line(line(Uuid::new_v4(), dec!(0.10), 3));
        cart.add_line(line(Uuid::new_v4(), dec!(19.99), 2));
        cart.add_line(line(Uuid::new_v4(), dec!(5.25), 4));

        // 0.30 + 39.98 + 21.00, with no binary float drift on the 0.10 line
        assert_eq!(cart.total(), dec!(61.28));
    }

    #[test]
    fn empty_cart_total_is_zero() {
        let cart = Cart::new(Uuid::new_v4());
        assert_eq!(cart.total(), Decimal::ZERO);
    }

    #[test]
    fn line_total_multiplies_price_by_quantity() {
        let entry = line(Uuid::new_v4(), dec!(2.99), 7);
        assert_eq!(entry.line_total(), dec!(20.93));
    }

    #[test]
    fn quantity_below_one_is_rejected() {
        let product = Uuid::new_v4();
        assert_eq!(
            CartLine::new(product, dec!(1.00), 0),
            Err(CartError::InvalidQuantity(0))
        );
        assert_eq!(
            CartLine::new(product, dec!(1.00), -3),
            Err(CartError::InvalidQuantity(-3))
        );

        let mut cart = Cart::new(Uuid::new_v4());
        cart.add_line(line(product, dec!(1.00), 1));
        assert_eq!(
            cart.set_quantity(product, 0),
            Err(CartError::InvalidQuantity(0))
        );
        assert_eq!(cart.line(product).unwrap().quantity(), 1);
    }

    #[test]
    fn add_line_merges_quantities_for_same_product() {
        let product = Uuid::new_v4();
        let mut cart = Cart::new(Uuid::new_v4());
        cart.add_line(line(product, dec!(4.00), 2));
        cart.add_line(line(product, dec!(4.00), 3));

        assert_eq!(cart.len(), 1);
        assert_eq!(cart.line(product).unwrap().quantity(), 5);
        assert_eq!(cart.total(), dec!(20.00));
    }

    #[test]
    fn add_line_saturates_merged_quantity() {
        let product = Uuid::new_v4();
        let mut cart = Cart::new(Uuid::new_v4());
        cart.add_line(line(product, dec!(1.00), i32::MAX));
        cart.add_line(line(product, dec!(1.00), 1));

        assert_eq!(cart.len(), 1);
        assert_eq!(cart.line(product).unwrap().quantity(), i32::MAX);
    }

    #[test]
    fn insert_line_rejects_duplicate_product() {
        let product = Uuid::new_v4();
        let mut cart = Cart::new(Uuid::new_v4());
        cart.insert_line(line(product, dec!(4.00), 2)).unwrap();

        assert_eq!(
            cart.insert_line(line(product, dec!(4.00), 1)),
            Err(CartError::DuplicateProduct(product))
        );
        assert_eq!(cart.line(product).unwrap().quantity(), 2);
    }

    #[test]
    fn set_quantity_of_absent_product_leaves_cart_unchanged() {
        let present = Uuid::new_v4();
        let absent = Uuid::new_v4();
        let mut cart = Cart::new(Uuid::new_v4());
        cart.add_line(line(present, dec!(9.99), 2));

        let before = cart.total();
        assert_eq!(
            cart.set_quantity(absent, 5),
            Err(CartError::ProductNotInCart(absent))
        );
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.total(), before);
    }

    #[test]
    fn remove_product_is_idempotent() {
        let product = Uuid::new_v4();
        let mut cart = Cart::new(Uuid::new_v4());
        cart.add_line(line(product, dec!(3.50), 1));

        assert!(cart.remove_product(product).is_some());
        assert!(cart.remove_product(product).is_none());
        assert!(cart.is_empty());
        assert_eq!(cart.total(), Decimal::ZERO);
    }

    #[test]
    fn clear_resets_total_to_zero() {
        let mut cart = Cart::new(Uuid::new_v4());
        cart.add_line(line(Uuid::new_v4(), dec!(12.00), 2));
        cart.add_line(line(Uuid::new_v4(), dec!(0.99), 5));

        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.total(), Decimal::ZERO);
    }

    #[test]
    fn running_scenario_keeps_exact_totals() {
        let product_a = Uuid::new_v4();
        let product_b = Uuid::new_v4();
        let mut cart = Cart::new(Uuid::new_v4());

        cart.add_line(line(product_a, dec!(9.99), 2));
        cart.add_line(line(product_b, dec!(3.50), 1));
        assert_eq!(cart.total(), dec!(23.48));

        cart.set_quantity(product_a, 1).unwrap();
        assert_eq!(cart.total(), dec!(13.49));

        cart.remove_product(product_b);
        assert_eq!(cart.total(), dec!(9.99));

        cart.clear();
        assert_eq!(cart.total(), dec!(0.00));
    }

    #[test]
    fn carts_for_same_customer_are_equal_and_hash_alike() {
        let customer = Uuid::new_v4();
        let mut first = Cart::new(customer);
        let mut second = Cart::new(customer);

        first.add_line(line(Uuid::new_v4(), dec!(9.99), 2));
        second.add_line(line(Uuid::new_v4(), dec!(1.25), 8));

        assert_eq!(first, second);
        assert_eq!(hash_of(&first), hash_of(&second));

        let other = Cart::new(Uuid::new_v4());
        assert_ne!(first, other);
    }
}
