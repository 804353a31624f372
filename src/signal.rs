/// A list of listeners that are called in connection order, synchronously,
/// every time a value is emitted.
pub struct Signal<T> {
    listeners: Vec<Box<dyn FnMut(&T)>>,
}

impl<T> Signal<T> {
    pub fn new() -> Self {
        Self { listeners: Vec::new() }
    }

    pub fn connect<F>(&mut self, listener: F)
    where
        F: FnMut(&T) + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn emit(&mut self, value: &T) {
        for listener in self.listeners.iter_mut() {
            listener(value);
        }
    }
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}
